//! Thin façade over intra-process (Rayon) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Handles are non-blocking: [`Test::test`] polls once, [`Wait::wait`]
//! blocks until the transfer has finished. The exchange engines poll with
//! `test` during a stage and only ever `wait` when draining.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::mesh_error::MeshError;

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait + Test + Send;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait + Test + Send;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u32, buf: &[u8]) -> Result<Self::SendHandle, MeshError>;
    /// Post a receive of exactly `len` bytes.
    fn irecv(&self, peer: usize, tag: u32, len: usize) -> Result<Self::RecvHandle, MeshError>;

    /// New communication context over the same ranks; messages never cross
    /// contexts. Collective: every rank must duplicate in the same order.
    fn duplicate(&self) -> Result<Self, MeshError>
    where
        Self: Sized;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Result<Option<Vec<u8>>, MeshError>;
}

/// Outcome of a single poll.
#[derive(Debug)]
pub enum Progress<H> {
    /// Finished; carries the payload of a receive.
    Done(Option<Vec<u8>>),
    /// Still in flight; the handle is handed back.
    Pending(H),
}

/// Anything that can be polled without blocking.
pub trait Test: Sized {
    fn test(self) -> Result<Progress<Self>, MeshError>;
}

/// Compile-time no-op comm for pure serial runs.
///
/// A single rank never sends: same-rank neighbors are filled by direct copy.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Result<Option<Vec<u8>>, MeshError> {
        Ok(None)
    }
}

impl Test for () {
    fn test(self) -> Result<Progress<Self>, MeshError> {
        Ok(Progress::Done(None))
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, peer: usize, _tag: u32, _buf: &[u8]) -> Result<(), MeshError> {
        Err(MeshError::comm(peer, "NoComm has no peers to send to"))
    }
    fn irecv(&self, peer: usize, _tag: u32, _len: usize) -> Result<(), MeshError> {
        Err(MeshError::comm(peer, "NoComm has no peers to receive from"))
    }
    fn duplicate(&self) -> Result<Self, MeshError> {
        Ok(NoComm)
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (u64, usize, usize, u32); // (context, src, dst, tag)

#[derive(Default)]
struct Mailbox {
    queues: Mutex<HashMap<Key, VecDeque<Bytes>>>,
    arrived: Condvar,
    // (parent context, n-th duplicate) -> context id
    contexts: Mutex<HashMap<(u64, u32), u64>>,
}

impl Mailbox {
    fn context_for(&self, parent: u64, nth: u32) -> u64 {
        let mut ctx = self.contexts.lock();
        let next = ctx.len() as u64 + 1;
        *ctx.entry((parent, nth)).or_insert(next)
    }
}

/// One rank of an in-process "world"; ranks are usually driven from
/// separate threads.
pub struct RayonComm {
    rank: usize,
    size: usize,
    ctx: u64,
    dups: Mutex<u32>,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for RayonComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl RayonComm {
    /// `n` ranks sharing one mailbox; element `r` is rank `r`.
    pub fn world(n: usize) -> Vec<Self> {
        let mailbox = Arc::new(Mailbox::default());
        (0..n)
            .map(|rank| Self {
                rank,
                size: n,
                ctx: 0,
                dups: Mutex::new(0),
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }

    fn check_peer(&self, peer: usize) -> Result<(), MeshError> {
        if peer < self.size {
            Ok(())
        } else {
            Err(MeshError::comm(
                peer,
                format!("peer outside world of {} ranks", self.size),
            ))
        }
    }
}

/// Sends are buffered in the mailbox and complete immediately.
#[derive(Debug)]
pub struct LocalSend;

impl Wait for LocalSend {
    fn wait(self) -> Result<Option<Vec<u8>>, MeshError> {
        Ok(None)
    }
}

impl Test for LocalSend {
    fn test(self) -> Result<Progress<Self>, MeshError> {
        Ok(Progress::Done(None))
    }
}

pub struct LocalRecv {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl std::fmt::Debug for LocalRecv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRecv")
            .field("key", &self.key)
            .field("len", &self.len)
            .finish()
    }
}

impl LocalRecv {
    fn land(&self, bytes: Bytes) -> Result<Option<Vec<u8>>, MeshError> {
        if bytes.len() != self.len {
            return Err(MeshError::comm(
                self.key.1,
                format!("expected {} bytes, got {}", self.len, bytes.len()),
            ));
        }
        Ok(Some(bytes.to_vec()))
    }
}

impl Test for LocalRecv {
    fn test(self) -> Result<Progress<Self>, MeshError> {
        let popped = self
            .mailbox
            .queues
            .lock()
            .get_mut(&self.key)
            .and_then(VecDeque::pop_front);
        match popped {
            Some(bytes) => Ok(Progress::Done(self.land(bytes)?)),
            None => Ok(Progress::Pending(self)),
        }
    }
}

impl Wait for LocalRecv {
    fn wait(self) -> Result<Option<Vec<u8>>, MeshError> {
        let mut queues = self.mailbox.queues.lock();
        loop {
            if let Some(bytes) = queues.get_mut(&self.key).and_then(VecDeque::pop_front) {
                drop(queues);
                return self.land(bytes);
            }
            self.mailbox.arrived.wait(&mut queues);
        }
    }
}

impl Communicator for RayonComm {
    type SendHandle = LocalSend;
    type RecvHandle = LocalRecv;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u32, buf: &[u8]) -> Result<LocalSend, MeshError> {
        self.check_peer(peer)?;
        let key = (self.ctx, self.rank, peer, tag);
        self.mailbox
            .queues
            .lock()
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        self.mailbox.arrived.notify_all();
        Ok(LocalSend)
    }

    fn irecv(&self, peer: usize, tag: u32, len: usize) -> Result<LocalRecv, MeshError> {
        self.check_peer(peer)?;
        Ok(LocalRecv {
            mailbox: Arc::clone(&self.mailbox),
            key: (self.ctx, peer, self.rank, tag),
            len,
        })
    }

    fn duplicate(&self) -> Result<Self, MeshError> {
        let nth = {
            let mut d = self.dups.lock();
            *d += 1;
            *d
        };
        Ok(Self {
            rank: self.rank,
            size: self.size,
            ctx: self.mailbox.context_for(self.ctx, nth),
            dups: Mutex::new(0),
            mailbox: Arc::clone(&self.mailbox),
        })
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Arc, Communicator, MeshError, Progress, Test, Wait};
    use mpi::Threading;
    use mpi::environment::Universe;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as MpiCommunicator, Destination, Source};

    /// MPI world (or a duplicate of it).
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Arc<Universe>,
    }

    // SAFETY: MPI is initialised with `Threading::Multiple`, so the
    // communicator may be used from any thread.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        pub fn new() -> Result<Self, MeshError> {
            let (universe, level) = mpi::initialize_with_threading(Threading::Multiple)
                .ok_or_else(|| MeshError::comm(0, "MPI already initialised"))?;
            if level < Threading::Multiple {
                log::warn!("MPI provides {level:?} threading only; keep exchanges on one thread");
            }
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: Arc::new(universe),
            })
        }
    }

    /// In-flight MPI request together with the leaked buffer it uses.
    pub struct MpiHandle {
        req: Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
        receive: bool,
    }

    // SAFETY: the buffer is exclusively owned by this handle until completion.
    unsafe impl Send for MpiHandle {}

    impl MpiHandle {
        fn finish(buf: *mut [u8], receive: bool) -> Option<Vec<u8>> {
            // SAFETY: `buf` came from `Box::into_raw` and the request is complete.
            let boxed = unsafe { Box::from_raw(buf) };
            receive.then(|| boxed.into_vec())
        }
    }

    impl Wait for MpiHandle {
        fn wait(self) -> Result<Option<Vec<u8>>, MeshError> {
            let Self { req, buf, receive } = self;
            req.wait();
            Ok(Self::finish(buf, receive))
        }
    }

    impl Test for MpiHandle {
        fn test(self) -> Result<Progress<Self>, MeshError> {
            let Self { req, buf, receive } = self;
            match req.test() {
                Ok(_status) => Ok(Progress::Done(Self::finish(buf, receive))),
                Err(req) => Ok(Progress::Pending(Self { req, buf, receive })),
            }
        }
    }

    fn mpi_tag(peer: usize, tag: u32) -> Result<i32, MeshError> {
        i32::try_from(tag).map_err(|_| MeshError::comm(peer, format!("tag {tag} exceeds MPI range")))
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u32, buf: &[u8]) -> Result<MpiHandle, MeshError> {
            let tag = mpi_tag(peer, tag)?;
            let raw = Box::into_raw(buf.to_vec().into_boxed_slice());
            // SAFETY: freed only in `MpiHandle::finish`, after completion.
            let data: &'static [u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, tag);
            Ok(MpiHandle {
                req,
                buf: raw,
                receive: false,
            })
        }

        fn irecv(&self, peer: usize, tag: u32, len: usize) -> Result<MpiHandle, MeshError> {
            let tag = mpi_tag(peer, tag)?;
            let raw = Box::into_raw(vec![0u8; len].into_boxed_slice());
            // SAFETY: as in `isend`; MPI is the only writer until completion.
            let data: &'static mut [u8] = unsafe { &mut *raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, data, tag);
            Ok(MpiHandle {
                req,
                buf: raw,
                receive: true,
            })
        }

        fn duplicate(&self) -> Result<Self, MeshError> {
            Ok(Self {
                world: self.world.duplicate(),
                rank: self.rank,
                size: self.size,
                _universe: Arc::clone(&self._universe),
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::mpi_tag;
        use crate::mesh_error::MeshError;

        #[test]
        fn tags_beyond_i32_are_comm_errors() {
            assert_eq!(mpi_tag(0, (7 << 6) | 55).unwrap(), (7 << 6) | 55);
            assert!(matches!(
                mpi_tag(3, u32::MAX),
                Err(MeshError::CommError { neighbor: 3, .. })
            ));
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::{MpiComm, MpiHandle};

/// Communication contexts owned by one exchange engine.
///
/// Variables and flux corrections travel on separate duplicates of the
/// caller's communicator, so their tags never collide.
#[derive(Debug)]
pub struct RuntimeContext<C: Communicator> {
    rank: usize,
    pub vars_comm: C,
    pub flux_comm: C,
}

impl<C: Communicator> RuntimeContext<C> {
    pub fn new(comm: &C) -> Result<Self, MeshError> {
        Ok(Self {
            rank: comm.rank(),
            vars_comm: comm.duplicate()?,
            flux_comm: comm.duplicate()?,
        })
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }
}
