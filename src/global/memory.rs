use crate::global::GlobalPtr;
use anyhow::Result;
use tracing::trace;

/// Seam to the global-memory layer of the embedding program.
///
/// The dependency engine needs two things from it: the translation of a
/// `{unit, segment, offset}` tuple to its canonical local form (so that two
/// pointers naming the same location compare equal), and the fetch primitive
/// behind copy-in dependencies.
pub trait GlobalMemory: Send + Sync + 'static {
    /// Resolve a global pointer that refers to the calling unit to its
    /// canonical local form (absolute address in `addr`). Pointers to other
    /// units are returned unchanged.
    fn localize(&self, gptr: GlobalPtr) -> GlobalPtr;

    /// Copy `len` bytes from `src` into the local buffer at `dest`. Called
    /// from the action of a copy-in prefetch task.
    fn get(&self, src: GlobalPtr, dest: u64, len: usize) -> Result<()>;
}

/// Address space in which offsets already are absolute local addresses and
/// data movement is managed by the embedding program. This is the right
/// collaborator for single-process runs and for tests.
#[derive(Debug, Default)]
pub struct IdentityMemory;

impl GlobalMemory for IdentityMemory {
    fn localize(&self, gptr: GlobalPtr) -> GlobalPtr {
        gptr
    }

    fn get(&self, src: GlobalPtr, dest: u64, len: usize) -> Result<()> {
        trace!(%src, dest, len, "copy-in fetch");
        Ok(())
    }
}
