//! Job Module
//!
//! Batch scripts executed against the store.
//!
//! ## Flow
//! 1. Scheduler lists `<dir>/*.job` and pushes each name onto the job stack
//! 2. Workers pop names, parse the script, and execute it line by line
//! 3. Results go to `<dir>/<name>.out`; BACKUP hands a copy of the store
//!    to the backup manager

mod command;
mod executor;
mod parser;
mod scheduler;
mod stack;

pub use command::JobCommand;
pub use executor::{JobExecutor, DELETE_MISSING, HELP_TEXT, READ_MISSING};
pub use parser::{parse_line, parse_script, MAX_WRITE_SIZE};
pub use scheduler::{Job, JobReport, JobScheduler, JOB_EXTENSION, OUTPUT_EXTENSION};
pub use stack::JobStack;
