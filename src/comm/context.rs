//! Communicator context: the rank group and its messaging primitives.
//!
//! The engine talks to a [`Communicator`] trait so the rank transport is
//! swappable. Shipped implementations are [`SingleRank`] for serial runs and
//! [`ChannelComm`] for in-process rank groups connected by crossbeam
//! channels. A communicator is constructed once at setup and refuses all
//! operations after shutdown.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::{SolverError, SolverResult};

/// Reserved tags for the min-reduction protocol.
const TAG_MIN_GATHER: u32 = u32::MAX - 1;
const TAG_MIN_BCAST: u32 = u32::MAX;

/// Point-to-point and collective primitives for one rank.
pub trait Communicator: Send {
    /// This rank's id within the group.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Send a tagged payload to another rank. Does not block on the receiver.
    fn send(&self, to: usize, tag: u32, data: Vec<f64>) -> SolverResult<()>;

    /// Receive the payload with the given source and tag, blocking until it
    /// arrives. Messages arriving out of order are stashed, not dropped.
    fn recv(&self, from: usize, tag: u32) -> SolverResult<Vec<f64>>;

    /// Global minimum of a per-rank value. Every rank must call this; it
    /// doubles as the lock-step barrier between steps.
    fn reduce_min(&self, local: f64) -> SolverResult<f64>;

    /// Tear the communicator down. Every later operation fails.
    fn shutdown(&self);
}

/// Communicator for a serial run: no peers, reductions are identities.
pub struct SingleRank {
    open: AtomicBool,
}

impl SingleRank {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
        }
    }

    fn check_open(&self) -> SolverResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SolverError::Comm("communicator is shut down".into()))
        }
    }
}

impl Default for SingleRank {
    fn default() -> Self {
        Self::new()
    }
}

impl Communicator for SingleRank {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, to: usize, _tag: u32, _data: Vec<f64>) -> SolverResult<()> {
        self.check_open()?;
        Err(SolverError::Comm(format!(
            "single-rank communicator has no peer rank {to}"
        )))
    }

    fn recv(&self, from: usize, _tag: u32) -> SolverResult<Vec<f64>> {
        self.check_open()?;
        Err(SolverError::Comm(format!(
            "single-rank communicator has no peer rank {from}"
        )))
    }

    fn reduce_min(&self, local: f64) -> SolverResult<f64> {
        self.check_open()?;
        Ok(local)
    }

    fn shutdown(&self) {
        self.open.store(false, Ordering::Release);
    }
}

struct Message {
    from: usize,
    tag: u32,
    data: Vec<f64>,
}

/// One rank's endpoint in an in-process channel group.
pub struct ChannelComm {
    rank: usize,
    senders: Vec<Sender<Message>>,
    receiver: Receiver<Message>,
    /// Messages received while waiting for a different (from, tag) pair.
    stash: Mutex<Vec<Message>>,
    open: AtomicBool,
}

impl ChannelComm {
    /// Build a fully connected group of `size` rank endpoints.
    pub fn group(size: usize) -> Vec<ChannelComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| unbounded::<Message>()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ChannelComm {
                rank,
                senders: senders.clone(),
                receiver,
                stash: Mutex::new(Vec::new()),
                open: AtomicBool::new(true),
            })
            .collect()
    }

    fn check_open(&self) -> SolverResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SolverError::Comm("communicator is shut down".into()))
        }
    }

    fn stash_lock(&self) -> SolverResult<std::sync::MutexGuard<'_, Vec<Message>>> {
        self.stash
            .lock()
            .map_err(|_| SolverError::Comm("message stash poisoned".into()))
    }
}

impl Communicator for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, to: usize, tag: u32, data: Vec<f64>) -> SolverResult<()> {
        self.check_open()?;
        let sender = self
            .senders
            .get(to)
            .ok_or_else(|| SolverError::Comm(format!("no rank {to} in a group of {}", self.size())))?;
        sender
            .send(Message {
                from: self.rank,
                tag,
                data,
            })
            .map_err(|_| SolverError::Comm(format!("rank {to} has disconnected")))
    }

    fn recv(&self, from: usize, tag: u32) -> SolverResult<Vec<f64>> {
        self.check_open()?;

        {
            let mut stash = self.stash_lock()?;
            if let Some(pos) = stash.iter().position(|m| m.from == from && m.tag == tag) {
                return Ok(stash.swap_remove(pos).data);
            }
        }

        loop {
            let msg = self
                .receiver
                .recv()
                .map_err(|_| SolverError::Comm("all peer ranks have disconnected".into()))?;
            if msg.from == from && msg.tag == tag {
                return Ok(msg.data);
            }
            self.stash_lock()?.push(msg);
        }
    }

    fn reduce_min(&self, local: f64) -> SolverResult<f64> {
        self.check_open()?;
        let size = self.size();
        if size == 1 {
            return Ok(local);
        }

        if self.rank == 0 {
            let mut min = local;
            for from in 1..size {
                let data = self.recv(from, TAG_MIN_GATHER)?;
                min = min.min(data[0]);
            }
            for to in 1..size {
                self.send(to, TAG_MIN_BCAST, vec![min])?;
            }
            Ok(min)
        } else {
            self.send(0, TAG_MIN_GATHER, vec![local])?;
            let data = self.recv(0, TAG_MIN_BCAST)?;
            Ok(data[0])
        }
    }

    fn shutdown(&self) {
        self.open.store(false, Ordering::Release);
    }
}
