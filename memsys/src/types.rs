/// Page protection states accepted by [`crate::protect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// Any read, write, or execute access faults.
    NoAccess,

    /// Memory can be read but not written or executed.
    ReadOnly,

    /// Memory can be read and written but not executed.
    ReadWrite,
}
