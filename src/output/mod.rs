//! Console output and progress reporting.

pub mod console;
pub mod progress;

pub use console::{
    print_config_summary, print_error, print_failure_summary, print_info, print_success,
    print_warning,
};
pub use progress::create_spinner;
