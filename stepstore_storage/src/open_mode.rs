use derive_more::Display;

/// The mode a transport is opened in.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
pub enum OpenMode {
    /// Create new objects.
    #[display("write")]
    Write,
    /// Resume writing into existing objects.
    ///
    /// Reserved for a future extension: no transport in this workspace supports it.
    #[display("append")]
    Append,
    /// Read existing objects.
    #[display("read")]
    Read,
}

impl OpenMode {
    /// Returns true if objects may be written in this mode.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Write | Self::Append)
    }
}
