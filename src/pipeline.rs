//! C5: the compressor pipeline. A fixed pool of worker threads, each
//! owning a job slot guarded by its own mutex+condvar, turns payload
//! chunks into packets while a single producer enforces that packets
//! reach the caller in strictly increasing payload order (§4.5, §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, trace};

use crate::chunking::{HashIndex, Matcher};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::stats::Stats;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

enum SlotState {
    Idle,
    PendingInput {
        payload: u64,
        data: Vec<u8>,
        entropy: bool,
    },
    /// Dequeued by the worker and being compressed. Distinct from `Idle`
    /// so `submit`'s idle scan can never reassign a slot that is still
    /// busy with the chunk it just took — only `drain_emit` consuming a
    /// `PendingOutput` returns a slot to `Idle`.
    Processing,
    PendingOutput {
        payload: u64,
        input_len: u64,
        bytes: Vec<u8>,
    },
}

struct Slot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

/// Accepts payload in submission order, distributes it across worker
/// threads, and emits packets back in the same order (§4.5).
pub struct Pipeline {
    slots: Vec<Arc<Slot>>,
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    jobs_done: Arc<(Mutex<()>, Condvar)>,
    global_payload: u64,
    emitted: u64,
}

impl Pipeline {
    pub fn new(config: EngineConfig, index: Arc<HashIndex>, stats: Arc<Stats>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let jobs_done = Arc::new((Mutex::new(()), Condvar::new()));

        let mut slots = Vec::with_capacity(config.threads);
        let mut handles = Vec::with_capacity(config.threads);

        for id in 0..config.threads {
            let slot = Arc::new(Slot {
                state: Mutex::new(SlotState::Idle),
                cond: Condvar::new(),
            });
            slots.push(slot.clone());

            let shutdown = shutdown.clone();
            let jobs_done = jobs_done.clone();
            let index = index.clone();
            let stats = stats.clone();
            let config = config.clone();

            let handle = std::thread::Builder::new()
                .name(format!("dupcore-worker-{id}"))
                .spawn(move || worker_loop(slot, shutdown, jobs_done, index, config, stats))
                .expect("failed to spawn compression worker");
            handles.push(handle);
        }

        Self {
            slots,
            handles,
            shutdown,
            jobs_done,
            global_payload: config.base_payload,
            emitted: config.base_payload,
        }
    }

    pub fn global_payload(&self) -> u64 {
        self.global_payload
    }

    /// `submit`: hand a chunk to the first idle worker, opportunistically
    /// draining ready output first. Blocks until a slot is free.
    pub fn submit(&mut self, src: &[u8], entropy: bool, out: &mut Vec<u8>) -> Result<()> {
        loop {
            self.drain_emit(out)?;
            if self.check_poisoned() {
                return Err(EngineError::Cancelled);
            }

            if let Some(slot) = self.slots.iter().find(|s| matches!(*s.state.lock().unwrap(), SlotState::Idle)) {
                let payload = self.global_payload;
                {
                    let mut state = slot.state.lock().unwrap();
                    *state = SlotState::PendingInput {
                        payload,
                        data: src.to_vec(),
                        entropy,
                    };
                }
                slot.cond.notify_one();
                self.global_payload += src.len() as u64;
                trace!(payload, len = src.len(), "submitted chunk to worker");
                return Ok(());
            }

            let (lock, cvar) = &*self.jobs_done;
            let guard = lock.lock().unwrap();
            let _ = cvar.wait_timeout(guard, POLL_INTERVAL);
        }
    }

    /// `flush_block`: block until every submitted chunk has been emitted.
    pub fn flush_block(&mut self, out: &mut Vec<u8>) -> Result<()> {
        while self.emitted < self.global_payload {
            self.drain_emit(out)?;
            if self.check_poisoned() {
                return Err(EngineError::Cancelled);
            }
            if self.emitted < self.global_payload {
                let (lock, cvar) = &*self.jobs_done;
                let guard = lock.lock().unwrap();
                let _ = cvar.wait_timeout(guard, POLL_INTERVAL);
            }
        }
        Ok(())
    }

    /// `drain_emit`: collect every slot in `PendingOutput` whose payload
    /// is exactly `self.emitted`, in order, so emission never reorders.
    fn drain_emit(&mut self, out: &mut Vec<u8>) -> Result<()> {
        loop {
            let mut advanced = false;
            for slot in &self.slots {
                let mut state = slot.state.lock().unwrap();
                let ready = matches!(&*state, SlotState::PendingOutput { payload, .. } if *payload == self.emitted);
                if ready {
                    if let SlotState::PendingOutput { bytes, input_len, .. } =
                        std::mem::replace(&mut *state, SlotState::Idle)
                    {
                        out.extend_from_slice(&bytes);
                        self.emitted += input_len;
                        advanced = true;
                    }
                }
                drop(state);
                if advanced {
                    slot.cond.notify_one();
                }
            }
            if !advanced {
                break;
            }
        }
        Ok(())
    }

    fn check_poisoned(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Signal shutdown and join all workers (§5 cancellation).
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for slot in &self.slots {
            slot.cond.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for slot in &self.slots {
            slot.cond.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    slot: Arc<Slot>,
    shutdown: Arc<AtomicBool>,
    jobs_done: Arc<(Mutex<()>, Condvar)>,
    index: Arc<HashIndex>,
    config: EngineConfig,
    stats: Arc<Stats>,
) {
    loop {
        let (payload, data, entropy) = {
            let mut state = slot.state.lock().unwrap();
            loop {
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }
                if let SlotState::PendingInput { .. } = &*state {
                    break;
                }
                let (guard, timeout) = slot.cond.wait_timeout(state, POLL_INTERVAL).unwrap();
                state = guard;
                let _ = timeout;
            }
            match std::mem::replace(&mut *state, SlotState::Processing) {
                SlotState::PendingInput { payload, data, entropy } => (payload, data, entropy),
                _ => unreachable!(),
            }
        };

        let matcher = Matcher::new(&index, &config, &stats);
        let mut bytes = Vec::new();
        if !entropy {
            matcher.hash_chunk(&data, payload);
        }
        if let Err(err) = matcher.process_chunk(&data, payload, entropy, &mut bytes) {
            debug!(%err, "worker failed to process chunk");
        }

        {
            let mut state = slot.state.lock().unwrap();
            *state = SlotState::PendingOutput {
                payload,
                input_len: data.len() as u64,
                bytes,
            };
        }

        let (lock, cvar) = &*jobs_done;
        let _guard = lock.lock().unwrap();
        cvar.notify_all();
    }
}
