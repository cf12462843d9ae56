//! Console output utilities.

use console::style;

use crate::pipeline::FailedJob;

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", style("INFO").cyan().bold(), message);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", style("OK").green().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", style("WARN").yellow().bold(), message);
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", style("ERROR").red().bold(), message);
}

/// Print configuration summary.
pub fn print_config_summary(targets: &[String], download_dir: &str) {
    println!();
    println!("{}", style("Configuration:").bold());
    println!("  Targets: {}", targets.join(", "));
    println!("  Directory: {}", download_dir);
    println!();
}

/// Print the failed downloads of a finished run.
pub fn print_failure_summary(failures: &[FailedJob]) {
    if failures.is_empty() {
        print_success("All downloads completed");
        return;
    }

    print_warning(&format!("{} download(s) failed:", failures.len()));
    for failed in failures {
        println!(
            "  {} item {}: {}",
            style(&failed.entity_title).bold(),
            failed.item.id,
            failed.reason
        );
    }
}
