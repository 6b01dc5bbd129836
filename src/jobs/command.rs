//! Job script commands

/// One parsed line of a job script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCommand {
    /// `WRITE [(k,v)(k2,v2)]`
    Write(Vec<(String, String)>),

    /// `READ [k,k2]`
    Read(Vec<String>),

    /// `DELETE [k,k2]`
    Delete(Vec<String>),

    /// `SHOW`
    Show,

    /// `WAIT <ms>`
    Wait(u64),

    /// `BACKUP`
    Backup,

    /// `HELP`
    Help,

    /// A line that did not parse; logged and skipped at execution
    Invalid { line: usize, reason: String },
}
