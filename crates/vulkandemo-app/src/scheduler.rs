//! Frame scheduling.
//!
//! [`FrameScheduler`] drives one frame per [`tick`](FrameScheduler::tick):
//! wait for the frame slot's fence, acquire a swapchain image, let the
//! caller record, submit, present, advance. Staleness reported by the
//! backend routes through a rebuild instead of failing the loop; the
//! fence wait at the top of the tick is the only point where the CPU
//! blocks on the GPU, bounding how many frames can be in flight.
//!
//! The scheduler talks to the GPU exclusively through [`FrameEngine`], so
//! the state machine can be exercised against fake collaborators.

use std::time::Duration;

use vulkandemo_gpu::{AcquiredImage, GpuError};

use crate::error::RunError;

/// Framebuffer extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameExtent {
    pub width: u32,
    pub height: u32,
}

impl FrameExtent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-area extent; nothing can be presented until a real resize
    /// arrives (e.g. the window is minimized).
    pub fn is_degenerate(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One frame's claim on a slot and a swapchain image.
///
/// Created at acquire time, consumed at present time, never persisted;
/// a swapchain rebuild invalidates any ticket minted before it.
#[derive(Debug, Clone, Copy)]
pub struct FrameTicket {
    /// Index of the frame slot in use.
    pub slot: usize,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// Monotonic frame counter.
    pub frame_number: u64,
}

/// Phase of the frame state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
    Rebuilding,
}

/// What a tick accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frame recorded, submitted and presented.
    Presented,
    /// Staleness detected at acquire; the swapchain was rebuilt and the
    /// tick skipped.
    Rebuilt,
    /// The surface has no area; nothing was done.
    Parked,
    /// No image became available in time; retry next tick.
    AcquireRetry,
    /// Frame submitted, but presentation reported staleness. The GPU
    /// work still completes; the next tick rebuilds first.
    StalePresent,
}

/// Bounded waits used by the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerTimeouts {
    /// Image acquisition wait.
    pub acquire: Duration,
    /// Frame-slot fence wait (the backpressure point).
    pub slot_wait: Duration,
    /// Per-slot fence wait during shutdown.
    pub shutdown: Duration,
}

impl Default for SchedulerTimeouts {
    fn default() -> Self {
        Self {
            acquire: Duration::from_secs(1),
            slot_wait: Duration::from_secs(5),
            shutdown: Duration::from_secs(5),
        }
    }
}

/// Operations the scheduler drives, in tick order.
///
/// Implemented by the real render context and by fakes in tests. Every
/// blocking operation takes an explicit timeout and reports expiry as a
/// typed error rather than hanging.
pub trait FrameEngine {
    /// Number of frame slots (frames in flight).
    fn frame_count(&self) -> usize;

    /// Block until the GPU has retired the slot's previous submission.
    fn wait_slot(&mut self, slot: usize, timeout: Duration) -> Result<(), GpuError>;

    /// Acquire the next swapchain image using the slot's semaphore.
    fn acquire_image(&mut self, slot: usize, timeout: Duration) -> Result<AcquiredImage, GpuError>;

    /// Ready the slot's resources and open its command buffer.
    fn begin_recording(&mut self, ticket: &FrameTicket) -> Result<(), GpuError>;

    /// Close the command buffer and submit it, arming the slot's fence.
    fn submit(&mut self, ticket: &FrameTicket) -> Result<(), GpuError>;

    /// Present the acquired image.
    fn present(&mut self, ticket: &FrameTicket) -> Result<(), GpuError>;

    /// Rebuild the swapchain for a new extent, invalidating outstanding
    /// tickets.
    fn rebuild(&mut self, extent: FrameExtent) -> Result<(), GpuError>;

    /// Wait for every slot's fence; the shutdown barrier.
    fn wait_all(&mut self, timeout: Duration) -> Result<(), GpuError>;
}

/// Per-frame orchestration state.
pub struct FrameScheduler {
    frame_index: usize,
    frame_number: u64,
    phase: Phase,
    extent: FrameExtent,
    pending_extent: Option<FrameExtent>,
    needs_rebuild: bool,
    timeouts: SchedulerTimeouts,
}

impl FrameScheduler {
    /// Create a scheduler for a surface of the given extent.
    pub fn new(extent: FrameExtent) -> Self {
        Self::with_timeouts(extent, SchedulerTimeouts::default())
    }

    /// Create a scheduler with explicit timeouts.
    pub fn with_timeouts(extent: FrameExtent, timeouts: SchedulerTimeouts) -> Self {
        Self {
            frame_index: 0,
            frame_number: 0,
            phase: Phase::Idle,
            extent,
            pending_extent: None,
            needs_rebuild: false,
            timeouts,
        }
    }

    /// Total frames presented or skipped so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Slot index the next tick will use.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Current phase; `Idle` between ticks, frozen at the failing phase
    /// after an error.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Record a framebuffer resize; the swapchain is rebuilt at the start
    /// of the next tick.
    pub fn note_resized(&mut self, extent: FrameExtent) {
        self.pending_extent = Some(extent);
        self.needs_rebuild = true;
    }

    fn enter(&mut self, phase: Phase) {
        tracing::trace!(from = ?self.phase, to = ?phase, "frame phase");
        self.phase = phase;
    }

    /// Run one frame iteration.
    ///
    /// `record` fills the slot's command buffer; the scheduler does not
    /// interpret what is recorded, only that recording happens between
    /// acquire and submit.
    ///
    /// Recoverable conditions (staleness, acquire timeout) are handled
    /// internally and reported through [`TickOutcome`]. Any error this
    /// returns means the loop cannot continue: the caller must tear down
    /// (slot fences may be left unarmed once a tick aborts midway).
    pub fn tick<E: FrameEngine>(
        &mut self,
        engine: &mut E,
        record: impl FnOnce(&mut E, &FrameTicket) -> Result<(), RunError>,
    ) -> Result<TickOutcome, RunError> {
        let target = self.pending_extent.unwrap_or(self.extent);
        if target.is_degenerate() {
            return Ok(TickOutcome::Parked);
        }

        // A rebuild requested by resize or by the previous tick's stale
        // present happens before this tick acquires anything.
        if self.needs_rebuild {
            self.rebuild(engine, target)?;
        }

        let slot = self.frame_index;

        self.enter(Phase::Acquiring);
        engine.wait_slot(slot, self.timeouts.slot_wait)?;

        let acquired = match engine.acquire_image(slot, self.timeouts.acquire) {
            Ok(acquired) => acquired,
            Err(GpuError::SwapchainStale) => {
                self.rebuild(engine, target)?;
                self.enter(Phase::Idle);
                return Ok(TickOutcome::Rebuilt);
            }
            Err(GpuError::AcquireTimeout) => {
                tracing::debug!(slot, "acquire timed out; retrying next tick");
                self.enter(Phase::Idle);
                return Ok(TickOutcome::AcquireRetry);
            }
            Err(e) => return Err(e.into()),
        };

        let ticket = FrameTicket {
            slot,
            image_index: acquired.image_index,
            frame_number: self.frame_number,
        };

        self.enter(Phase::Recording);
        engine.begin_recording(&ticket)?;
        record(engine, &ticket)?;

        self.enter(Phase::Submitted);
        engine.submit(&ticket)?;

        if acquired.suboptimal {
            self.needs_rebuild = true;
        }

        self.enter(Phase::Presenting);
        let outcome = match engine.present(&ticket) {
            Ok(()) => TickOutcome::Presented,
            Err(GpuError::SwapchainStale) => {
                // The submitted frame's work still completes on the GPU;
                // the slot's fence wait next cycle accounts for it.
                self.needs_rebuild = true;
                TickOutcome::StalePresent
            }
            Err(e) => return Err(e.into()),
        };

        self.frame_index = (self.frame_index + 1) % engine.frame_count();
        self.frame_number += 1;
        self.enter(Phase::Idle);

        Ok(outcome)
    }

    fn rebuild<E: FrameEngine>(
        &mut self,
        engine: &mut E,
        extent: FrameExtent,
    ) -> Result<(), RunError> {
        self.enter(Phase::Rebuilding);
        engine.rebuild(extent)?;
        self.extent = extent;
        self.pending_extent = None;
        self.needs_rebuild = false;
        Ok(())
    }

    /// Complete all in-flight GPU work before any resource is released.
    pub fn shutdown<E: FrameEngine>(&mut self, engine: &mut E) -> Result<(), RunError> {
        engine.wait_all(self.timeouts.shutdown)?;
        self.enter(Phase::Idle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        WaitSlot(usize),
        Acquire,
        Begin(usize),
        Submit(usize),
        Present(u64),
        Rebuild,
    }

    struct FakeEngine {
        frame_count: usize,
        image_count: usize,
        next_image: u32,
        fence_armed: Vec<bool>,
        armed_high_water: usize,
        // 1-based acquire call ordinals that fail
        stale_acquires: HashSet<usize>,
        timeout_acquires: HashSet<usize>,
        // frame numbers whose present fails
        stale_presents: HashSet<u64>,
        timeout_slot_waits: HashSet<usize>,
        acquire_calls: usize,
        wait_calls: usize,
        format: &'static str,
        extent: FrameExtent,
        presented: Vec<u64>,
        events: Vec<Event>,
    }

    impl FakeEngine {
        fn new(frame_count: usize) -> Self {
            Self {
                frame_count,
                image_count: 3,
                next_image: 0,
                fence_armed: vec![false; frame_count],
                armed_high_water: 0,
                stale_acquires: HashSet::new(),
                timeout_acquires: HashSet::new(),
                stale_presents: HashSet::new(),
                timeout_slot_waits: HashSet::new(),
                acquire_calls: 0,
                wait_calls: 0,
                format: "B8G8R8A8_SRGB",
                extent: FrameExtent::new(800, 600),
                presented: Vec::new(),
                events: Vec::new(),
            }
        }
    }

    impl FrameEngine for FakeEngine {
        fn frame_count(&self) -> usize {
            self.frame_count
        }

        fn wait_slot(&mut self, slot: usize, _timeout: Duration) -> Result<(), GpuError> {
            self.events.push(Event::WaitSlot(slot));
            self.wait_calls += 1;
            if self.timeout_slot_waits.contains(&self.wait_calls) {
                return Err(GpuError::FrameTimeout { slot });
            }
            // The fake GPU retires work the moment it is waited on.
            self.fence_armed[slot] = false;
            Ok(())
        }

        fn acquire_image(
            &mut self,
            _slot: usize,
            _timeout: Duration,
        ) -> Result<AcquiredImage, GpuError> {
            self.events.push(Event::Acquire);
            self.acquire_calls += 1;
            if self.stale_acquires.contains(&self.acquire_calls) {
                return Err(GpuError::SwapchainStale);
            }
            if self.timeout_acquires.contains(&self.acquire_calls) {
                return Err(GpuError::AcquireTimeout);
            }
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count as u32;
            Ok(AcquiredImage {
                image_index,
                suboptimal: false,
            })
        }

        fn begin_recording(&mut self, ticket: &FrameTicket) -> Result<(), GpuError> {
            assert!(
                !self.fence_armed[ticket.slot],
                "slot {} reused while its previous submission is outstanding",
                ticket.slot
            );
            self.events.push(Event::Begin(ticket.slot));
            Ok(())
        }

        fn submit(&mut self, ticket: &FrameTicket) -> Result<(), GpuError> {
            self.events.push(Event::Submit(ticket.slot));
            self.fence_armed[ticket.slot] = true;
            let armed = self.fence_armed.iter().filter(|&&armed| armed).count();
            self.armed_high_water = self.armed_high_water.max(armed);
            Ok(())
        }

        fn present(&mut self, ticket: &FrameTicket) -> Result<(), GpuError> {
            self.events.push(Event::Present(ticket.frame_number));
            if self.stale_presents.contains(&ticket.frame_number) {
                return Err(GpuError::SwapchainStale);
            }
            self.presented.push(ticket.frame_number);
            Ok(())
        }

        fn rebuild(&mut self, extent: FrameExtent) -> Result<(), GpuError> {
            self.events.push(Event::Rebuild);
            self.extent = extent;
            Ok(())
        }

        fn wait_all(&mut self, _timeout: Duration) -> Result<(), GpuError> {
            for armed in &mut self.fence_armed {
                *armed = false;
            }
            Ok(())
        }
    }

    fn no_op(_: &mut FakeEngine, _: &FrameTicket) -> Result<(), RunError> {
        Ok(())
    }

    #[test]
    fn ten_ticks_present_ten_frames() {
        let mut engine = FakeEngine::new(2);
        let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

        for _ in 0..10 {
            let outcome = scheduler.tick(&mut engine, no_op).unwrap();
            assert_eq!(outcome, TickOutcome::Presented);
        }

        assert_eq!(engine.presented, (0..10).collect::<Vec<_>>());
        assert_eq!(scheduler.frame_number(), 10);
        assert_eq!(scheduler.phase(), Phase::Idle);
    }

    #[test]
    fn slots_cycle_modulo_frame_count() {
        let mut engine = FakeEngine::new(2);
        let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

        for _ in 0..4 {
            scheduler.tick(&mut engine, no_op).unwrap();
        }

        let waited: Vec<usize> = engine
            .events
            .iter()
            .filter_map(|e| match e {
                Event::WaitSlot(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(waited, vec![0, 1, 0, 1]);
    }

    #[test]
    fn at_most_frame_count_frames_in_flight() {
        for frame_count in [1, 2, 3] {
            let mut engine = FakeEngine::new(frame_count);
            let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

            for _ in 0..20 {
                scheduler.tick(&mut engine, no_op).unwrap();
            }

            assert!(
                engine.armed_high_water <= frame_count,
                "{} frames in flight with only {} slots",
                engine.armed_high_water,
                frame_count
            );
        }
    }

    #[test]
    fn stale_present_rebuilds_before_next_acquire() {
        let mut engine = FakeEngine::new(2);
        // Tick 5 carries frame number 4.
        engine.stale_presents.insert(4);
        let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

        let mut outcomes = Vec::new();
        for _ in 0..10 {
            outcomes.push(scheduler.tick(&mut engine, no_op).unwrap());
        }

        assert_eq!(outcomes[4], TickOutcome::StalePresent);
        assert!(outcomes[..4]
            .iter()
            .chain(&outcomes[5..])
            .all(|o| *o == TickOutcome::Presented));

        // Frame 4 was skipped, everything else presented.
        assert_eq!(engine.presented, vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);

        // The rebuild lands between tick 5's present and tick 6's acquire.
        let present_4 = engine
            .events
            .iter()
            .position(|e| *e == Event::Present(4))
            .unwrap();
        let rebuild = engine
            .events
            .iter()
            .position(|e| *e == Event::Rebuild)
            .unwrap();
        let next_acquire = engine.events[present_4..]
            .iter()
            .position(|e| *e == Event::Acquire)
            .unwrap()
            + present_4;
        assert!(present_4 < rebuild && rebuild < next_acquire);

        // Rebuild preserves format.
        assert_eq!(engine.format, "B8G8R8A8_SRGB");
    }

    #[test]
    fn stale_acquire_rebuilds_and_skips_tick() {
        let mut engine = FakeEngine::new(2);
        engine.stale_acquires.insert(3);
        let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

        let mut outcomes = Vec::new();
        for _ in 0..10 {
            outcomes.push(scheduler.tick(&mut engine, no_op).unwrap());
        }

        assert_eq!(outcomes[2], TickOutcome::Rebuilt);
        assert_eq!(
            outcomes.iter().filter(|o| **o == TickOutcome::Presented).count(),
            9
        );
        assert_eq!(engine.events.iter().filter(|e| **e == Event::Rebuild).count(), 1);
        // Nothing was submitted for the skipped tick.
        assert_eq!(
            engine.events.iter().filter(|e| matches!(e, Event::Submit(_))).count(),
            9
        );
    }

    #[test]
    fn acquire_timeout_retries_next_tick() {
        let mut engine = FakeEngine::new(2);
        engine.timeout_acquires.insert(2);
        let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(scheduler.tick(&mut engine, no_op).unwrap());
        }

        assert_eq!(
            outcomes,
            vec![
                TickOutcome::Presented,
                TickOutcome::AcquireRetry,
                TickOutcome::Presented
            ]
        );
        // The skipped tick advanced no frame state.
        assert_eq!(engine.presented, vec![0, 1]);
    }

    #[test]
    fn slot_timeout_is_fatal() {
        let mut engine = FakeEngine::new(2);
        engine.timeout_slot_waits.insert(1);
        let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

        let err = scheduler.tick(&mut engine, no_op).unwrap_err();
        assert!(matches!(
            err,
            RunError::Gpu(GpuError::FrameTimeout { slot: 0 })
        ));
        assert_eq!(scheduler.phase(), Phase::Acquiring);
    }

    #[test]
    fn resize_rebuilds_once() {
        let mut engine = FakeEngine::new(2);
        let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

        scheduler.tick(&mut engine, no_op).unwrap();
        scheduler.note_resized(FrameExtent::new(1024, 768));
        scheduler.tick(&mut engine, no_op).unwrap();
        scheduler.tick(&mut engine, no_op).unwrap();

        assert_eq!(engine.events.iter().filter(|e| **e == Event::Rebuild).count(), 1);
        assert_eq!(engine.extent, FrameExtent::new(1024, 768));
    }

    #[test]
    fn repeated_rebuild_with_same_extent_is_idempotent() {
        let mut engine = FakeEngine::new(2);
        let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

        let image_count = engine.image_count;
        scheduler.note_resized(FrameExtent::new(800, 600));
        scheduler.tick(&mut engine, no_op).unwrap();
        scheduler.note_resized(FrameExtent::new(800, 600));
        scheduler.tick(&mut engine, no_op).unwrap();

        assert_eq!(engine.image_count, image_count);
        assert_eq!(engine.format, "B8G8R8A8_SRGB");
        assert_eq!(engine.extent, FrameExtent::new(800, 600));
    }

    #[test]
    fn degenerate_extent_parks_until_real_resize() {
        let mut engine = FakeEngine::new(2);
        let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

        scheduler.note_resized(FrameExtent::new(0, 0));
        assert_eq!(
            scheduler.tick(&mut engine, no_op).unwrap(),
            TickOutcome::Parked
        );
        assert_eq!(engine.acquire_calls, 0);

        scheduler.note_resized(FrameExtent::new(640, 480));
        assert_eq!(
            scheduler.tick(&mut engine, no_op).unwrap(),
            TickOutcome::Presented
        );
        assert_eq!(engine.extent, FrameExtent::new(640, 480));
    }

    #[test]
    fn shutdown_waits_all_slots() {
        let mut engine = FakeEngine::new(3);
        let mut scheduler = FrameScheduler::new(FrameExtent::new(800, 600));

        for _ in 0..3 {
            scheduler.tick(&mut engine, no_op).unwrap();
        }
        scheduler.shutdown(&mut engine).unwrap();

        assert!(engine.fence_armed.iter().all(|armed| !armed));
    }
}
