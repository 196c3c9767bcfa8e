use colored::Colorize;

fn main() {
    if let Err(e) = tabreport::app::run_cli() {
        eprintln!("{} {}", ":: Error ::".red().bold(), e.red());
        std::process::exit(1);
    }
}
