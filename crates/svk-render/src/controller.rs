// SPDX-License-Identifier: CEPL-1.0
//! Frame cycle controller.
//!
//! One call to [`FrameController::draw_frame`] runs one logical frame:
//!
//! ```text
//! WaitPrevious -> Acquire -> (Recreate) -> Record -> Submit -> Present -> (Recreate)
//! ```
//!
//! The only ordering between frames is the one carried by the slot's
//! primitives: image-ready (acquired before rendered), render-finished
//! (rendered before presented) and the in-flight fence (completed before the
//! slot is reused). The controller never polls GPU progress any other way.

use tracing::{debug, info, trace};

use crate::error::FrameResult;
use crate::{RenderSize, SurfaceStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    /// Monotonic frame counter.
    pub frame: u64,
    /// Frame-in-flight slot owning the primitives and command buffer.
    pub slot: usize,
    pub image_index: u32,
}

/// Everything the controller needs from a backend.
///
/// Implementations own one image-ready semaphore, one render-finished
/// semaphore, one in-flight fence and one command buffer per slot.
pub trait FrameDevice {
    fn frames_in_flight(&self) -> usize;

    /// Blocks on the slot's in-flight fence without a timeout.
    fn wait_for_slot(&mut self, slot: usize) -> FrameResult<()>;

    /// Requests the next image and arranges for the slot's image-ready
    /// semaphore to be signaled. The index is meaningless for `OutOfDate`.
    fn acquire(&mut self, slot: usize) -> FrameResult<(u32, SurfaceStatus)>;

    /// Unsignals the slot's in-flight fence ahead of submission.
    fn reset_slot(&mut self, slot: usize) -> FrameResult<()>;

    fn record(&mut self, frame: &FrameInfo) -> FrameResult<()>;

    /// Waits on image-ready, signals render-finished and the in-flight fence.
    fn submit(&mut self, frame: &FrameInfo) -> FrameResult<()>;

    /// Presents after render-finished.
    fn present(&mut self, frame: &FrameInfo) -> FrameResult<SurfaceStatus>;

    fn wait_idle(&mut self) -> FrameResult<()>;

    /// Rebuilds the presentable image set. Only called after `wait_idle`.
    /// `false` means the surface has no area yet and nothing was rebuilt.
    fn recreate(&mut self, size: RenderSize) -> FrameResult<bool>;
}

/// When a resize notification recreates the image set.
///
/// Debouncing keeps continuous interactive resizing from rebuilding the
/// swapchain on every event. It is a tuning knob: stale images are still
/// caught through `OutOfDate`/`SubOptimal`, and a skipped resize is applied
/// once the window has passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizePolicy {
    Immediate,
    /// At least `frames` frames between resize-driven recreations.
    Debounce { frames: u64 },
}

impl Default for ResizePolicy {
    fn default() -> Self {
        ResizePolicy::Debounce { frames: 10 }
    }
}

impl ResizePolicy {
    /// `0` means recreate on every resize.
    pub fn from_frames(frames: u64) -> Self {
        if frames == 0 {
            ResizePolicy::Immediate
        } else {
            ResizePolicy::Debounce { frames }
        }
    }

    fn allows(self, frame: u64, last: Option<u64>) -> bool {
        match (self, last) {
            (ResizePolicy::Immediate, _) | (_, None) => true,
            (ResizePolicy::Debounce { frames }, Some(last)) => frame.saturating_sub(last) >= frames,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Presented, then the image set was rebuilt after driver feedback.
    PresentedAndRecreated,
    /// Acquire reported `OutOfDate`; the set was rebuilt and nothing was
    /// submitted or presented.
    Abandoned,
    /// The window or its surface is minimized; no GPU work happened. Call
    /// again once a non-zero size has been reported.
    Parked,
}

pub struct FrameController<D: FrameDevice> {
    device: D,
    frame: u64,
    slot: usize,
    slots: usize,
    window_size: RenderSize,
    resize_policy: ResizePolicy,
    parked: bool,
    pending_resize: bool,
    last_resize_recreate: Option<u64>,
}

impl<D: FrameDevice> FrameController<D> {
    pub fn new(device: D, window_size: RenderSize, resize_policy: ResizePolicy) -> Self {
        let slots = device.frames_in_flight().max(1);
        debug!(
            "frame controller: {} slot(s), window {}x{}, resize {:?}",
            slots, window_size.width, window_size.height, resize_policy
        );
        Self {
            device,
            frame: 0,
            slot: 0,
            slots,
            window_size,
            resize_policy,
            parked: false,
            pending_resize: false,
            last_resize_recreate: None,
        }
    }

    pub fn draw_frame(&mut self) -> FrameResult<FrameOutcome> {
        if self.parked {
            if self.window_size.is_zero() {
                return Ok(FrameOutcome::Parked);
            }
            info!(
                "surface restored at {}x{}",
                self.window_size.width, self.window_size.height
            );
            self.parked = false;
            if !self.recreate()? {
                return Ok(FrameOutcome::Parked);
            }
            return Ok(FrameOutcome::Abandoned);
        }

        if self.pending_resize
            && !self.window_size.is_zero()
            && self.resize_policy.allows(self.frame, self.last_resize_recreate)
        {
            trace!("applying deferred resize");
            if !self.recreate()? {
                return Ok(FrameOutcome::Parked);
            }
            self.last_resize_recreate = Some(self.frame);
        }

        let slot = self.slot;

        // WaitPrevious
        self.device.wait_for_slot(slot)?;

        // Acquire
        let (image_index, acquired) = self.device.acquire(slot)?;
        if acquired == SurfaceStatus::OutOfDate {
            return self.recover_out_of_date();
        }
        self.device.reset_slot(slot)?;

        let info = FrameInfo {
            frame: self.frame,
            slot,
            image_index,
        };

        // Record, Submit, Present
        self.device.record(&info)?;
        self.device.submit(&info)?;
        let presented = self.device.present(&info)?;

        self.frame += 1;
        self.slot = (slot + 1) % self.slots;

        if !(acquired.needs_recreate() || presented.needs_recreate()) {
            return Ok(FrameOutcome::Presented);
        }

        debug!(
            "frame {}: acquire {:?}, present {:?} -> recreate",
            info.frame, acquired, presented
        );
        if self.window_size.is_zero() {
            self.parked = true;
            return Ok(FrameOutcome::Presented);
        }
        if !self.recreate()? {
            return Ok(FrameOutcome::Presented);
        }
        Ok(FrameOutcome::PresentedAndRecreated)
    }

    /// Records the new window size and, if the policy allows, rebuilds the
    /// image set right away. Returns whether a rebuild happened.
    pub fn notify_resize(&mut self, size: RenderSize) -> FrameResult<bool> {
        self.window_size = size;

        if size.is_zero() {
            debug!("window minimized");
            return Ok(false);
        }
        if self.parked {
            // the next draw_frame rebuilds unconditionally
            return Ok(false);
        }
        if !self.resize_policy.allows(self.frame, self.last_resize_recreate) {
            trace!("resize to {}x{} deferred", size.width, size.height);
            self.pending_resize = true;
            return Ok(false);
        }

        let rebuilt = self.recreate()?;
        if rebuilt {
            self.last_resize_recreate = Some(self.frame);
        }
        Ok(rebuilt)
    }

    /// Drains all queues. Must run before any primitive or image is freed.
    pub fn shutdown(&mut self) -> FrameResult<()> {
        self.device.wait_idle()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn window_size(&self) -> RenderSize {
        self.window_size
    }

    pub fn is_parked(&self) -> bool {
        self.parked
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn recover_out_of_date(&mut self) -> FrameResult<FrameOutcome> {
        if self.window_size.is_zero() {
            debug!("out of date while minimized, parking");
            self.parked = true;
            return Ok(FrameOutcome::Parked);
        }
        if !self.recreate()? {
            return Ok(FrameOutcome::Parked);
        }
        Ok(FrameOutcome::Abandoned)
    }

    /// Parks instead when the surface reports no area.
    fn recreate(&mut self) -> FrameResult<bool> {
        self.device.wait_idle()?;
        if !self.device.recreate(self.window_size)? {
            debug!("surface has no area, parking");
            self.parked = true;
            return Ok(false);
        }
        self.pending_resize = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::FrameError;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize, u32),
        Submit(usize, u32),
        Present(usize, u32),
        WaitIdle,
        Recreate(RenderSize),
    }

    /// Scripted backend. Models each slot's fence so that reusing a slot
    /// without waiting on it, or waiting on a fence nobody will signal,
    /// panics.
    struct MockDevice {
        calls: Vec<Call>,
        acquire_script: VecDeque<FrameResult<(u32, SurfaceStatus)>>,
        present_script: VecDeque<FrameResult<SurfaceStatus>>,
        fence_signaled: Vec<bool>,
        fence_pending: Vec<bool>,
        image_count: u32,
        next_image: u32,
        fail_wait: bool,
        surface_empty: bool,
    }

    impl MockDevice {
        fn new(slots: usize) -> Self {
            Self {
                calls: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fence_signaled: vec![true; slots],
                fence_pending: vec![false; slots],
                image_count: 3,
                next_image: 0,
                fail_wait: false,
                surface_empty: false,
            }
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }
    }

    impl FrameDevice for MockDevice {
        fn frames_in_flight(&self) -> usize {
            self.fence_signaled.len()
        }

        fn wait_for_slot(&mut self, slot: usize) -> FrameResult<()> {
            self.calls.push(Call::Wait(slot));
            if self.fail_wait {
                return Err(FrameError::SyncWait("device lost".into()));
            }
            if !self.fence_signaled[slot] {
                assert!(self.fence_pending[slot], "waiting on a fence that will never signal");
                self.fence_signaled[slot] = true;
                self.fence_pending[slot] = false;
            }
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> FrameResult<(u32, SurfaceStatus)> {
            assert!(self.fence_signaled[slot], "slot {slot} reused while in flight");
            self.calls.push(Call::Acquire(slot));
            if let Some(scripted) = self.acquire_script.pop_front() {
                return scripted;
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok((index, SurfaceStatus::Ready))
        }

        fn reset_slot(&mut self, slot: usize) -> FrameResult<()> {
            self.calls.push(Call::Reset(slot));
            self.fence_signaled[slot] = false;
            Ok(())
        }

        fn record(&mut self, frame: &FrameInfo) -> FrameResult<()> {
            self.calls.push(Call::Record(frame.slot, frame.image_index));
            Ok(())
        }

        fn submit(&mut self, frame: &FrameInfo) -> FrameResult<()> {
            self.calls.push(Call::Submit(frame.slot, frame.image_index));
            self.fence_pending[frame.slot] = true;
            Ok(())
        }

        fn present(&mut self, frame: &FrameInfo) -> FrameResult<SurfaceStatus> {
            self.calls.push(Call::Present(frame.slot, frame.image_index));
            self.present_script
                .pop_front()
                .unwrap_or(Ok(SurfaceStatus::Ready))
        }

        fn wait_idle(&mut self) -> FrameResult<()> {
            self.calls.push(Call::WaitIdle);
            for slot in 0..self.fence_signaled.len() {
                if self.fence_pending[slot] {
                    self.fence_signaled[slot] = true;
                    self.fence_pending[slot] = false;
                }
            }
            Ok(())
        }

        fn recreate(&mut self, size: RenderSize) -> FrameResult<bool> {
            self.calls.push(Call::Recreate(size));
            Ok(!self.surface_empty)
        }
    }

    fn controller(slots: usize, size: RenderSize) -> FrameController<MockDevice> {
        FrameController::new(MockDevice::new(slots), size, ResizePolicy::Immediate)
    }

    const WINDOW: RenderSize = RenderSize::new(800, 600);

    #[test]
    fn frame_runs_steps_in_order() {
        let mut c = controller(2, WINDOW);
        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Presented);
        assert_eq!(
            c.device().calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Submit(0, 0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(c.frame(), 1);
        assert_eq!(c.slot(), 1);
    }

    #[test]
    fn slots_rotate_and_each_reuse_waits_on_its_fence() {
        let mut c = controller(2, WINDOW);
        for _ in 0..5 {
            c.draw_frame().unwrap();
        }
        let calls = &c.device().calls;
        let acquired: Vec<usize> = calls
            .iter()
            .filter_map(|call| match call {
                Call::Acquire(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(acquired, vec![0, 1, 0, 1, 0]);

        for (i, call) in calls.iter().enumerate() {
            if let Call::Acquire(slot) = call {
                assert_eq!(calls[i - 1], Call::Wait(*slot));
            }
        }
    }

    #[test]
    fn out_of_date_acquire_recreates_and_skips_the_frame() {
        let mut c = controller(2, WINDOW);
        c.device_mut()
            .acquire_script
            .push_back(Ok((0, SurfaceStatus::OutOfDate)));

        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Abandoned);
        assert_eq!(
            c.device().calls,
            vec![Call::Wait(0), Call::Acquire(0), Call::WaitIdle, Call::Recreate(WINDOW)]
        );
        // the fence was never reset, so the same slot is immediately usable
        assert_eq!(c.slot(), 0);
        assert_eq!(c.frame(), 0);
        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Presented);
    }

    #[test]
    fn minimized_out_of_date_parks_until_a_real_size_arrives() {
        let mut c = controller(2, WINDOW);
        c.notify_resize(RenderSize::new(0, 0)).unwrap();
        c.device_mut()
            .acquire_script
            .push_back(Ok((0, SurfaceStatus::OutOfDate)));

        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Parked);
        assert!(c.is_parked());
        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Parked);

        let d = c.device();
        assert_eq!(d.count(|x| matches!(x, Call::Submit(..))), 0);
        assert_eq!(d.count(|x| matches!(x, Call::Present(..))), 0);
        assert_eq!(d.count(|x| matches!(x, Call::Recreate(..))), 0);

        let restored = RenderSize::new(1024, 768);
        assert!(!c.notify_resize(restored).unwrap());
        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Abandoned);
        assert!(!c.is_parked());
        assert_eq!(
            c.device().calls[c.device().calls.len() - 2..],
            [Call::WaitIdle, Call::Recreate(restored)]
        );
        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Presented);
    }

    #[test]
    fn empty_surface_parks_even_with_a_nonzero_window() {
        let mut c = controller(2, WINDOW);
        c.device_mut().surface_empty = true;
        c.device_mut()
            .acquire_script
            .push_back(Ok((0, SurfaceStatus::OutOfDate)));

        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Parked);
        assert!(c.is_parked());
        // still nothing to build against; no frame is submitted
        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Parked);
        assert!(!c.notify_resize(WINDOW).unwrap());
        assert_eq!(c.device().count(|x| matches!(x, Call::Submit(..))), 0);
        assert_eq!(c.device().count(|x| matches!(x, Call::Present(..))), 0);

        c.device_mut().surface_empty = false;
        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Abandoned);
        assert!(!c.is_parked());
        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Presented);
    }

    #[test]
    fn empty_surface_on_resize_is_retried_later() {
        let mut c = controller(2, WINDOW);
        c.device_mut().surface_empty = true;
        assert!(!c.notify_resize(RenderSize::new(640, 480)).unwrap());
        assert!(c.is_parked());

        c.device_mut().surface_empty = false;
        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Abandoned);
        assert_eq!(
            c.device().calls.last(),
            Some(&Call::Recreate(RenderSize::new(640, 480)))
        );
    }

    #[test]
    fn suboptimal_acquire_still_presents_then_recreates() {
        let mut c = controller(2, WINDOW);
        c.device_mut()
            .acquire_script
            .push_back(Ok((2, SurfaceStatus::SubOptimal)));

        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::PresentedAndRecreated);
        assert_eq!(
            c.device().calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 2),
                Call::Submit(0, 2),
                Call::Present(0, 2),
                Call::WaitIdle,
                Call::Recreate(WINDOW),
            ]
        );
        assert_eq!(c.frame(), 1);
    }

    #[test]
    fn out_of_date_present_recreates_without_failing() {
        let mut c = controller(2, WINDOW);
        c.device_mut()
            .present_script
            .push_back(Ok(SurfaceStatus::OutOfDate));

        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::PresentedAndRecreated);
        assert_eq!(c.device().count(|x| matches!(x, Call::Recreate(_))), 1);
        assert_eq!(c.draw_frame().unwrap(), FrameOutcome::Presented);
    }

    #[test]
    fn suboptimal_present_uses_last_known_size() {
        let mut c = FrameController::new(
            MockDevice::new(2),
            WINDOW,
            ResizePolicy::Debounce { frames: 100 },
        );
        // first resize goes through, second one is debounced
        c.notify_resize(RenderSize::new(640, 480)).unwrap();
        assert!(!c.notify_resize(RenderSize::new(1280, 720)).unwrap());
        c.device_mut()
            .present_script
            .push_back(Ok(SurfaceStatus::SubOptimal));

        c.draw_frame().unwrap();
        assert_eq!(
            c.device().calls.last(),
            Some(&Call::Recreate(RenderSize::new(1280, 720)))
        );
    }

    #[test]
    fn present_failure_is_fatal() {
        let mut c = controller(2, WINDOW);
        c.device_mut()
            .present_script
            .push_back(Err(FrameError::Present("surface lost".into())));

        let err = c.draw_frame().unwrap_err();
        assert!(matches!(err, FrameError::Present(_)));
        assert_eq!(c.device().count(|x| matches!(x, Call::Recreate(_))), 0);
    }

    #[test]
    fn acquire_failure_is_fatal() {
        let mut c = controller(2, WINDOW);
        c.device_mut()
            .acquire_script
            .push_back(Err(FrameError::Acquire("device lost".into())));

        assert!(matches!(c.draw_frame(), Err(FrameError::Acquire(_))));
        assert_eq!(c.device().count(|x| matches!(x, Call::Reset(_))), 0);
    }

    #[test]
    fn sync_wait_failure_stops_before_acquire() {
        let mut c = controller(2, WINDOW);
        c.device_mut().fail_wait = true;

        assert!(matches!(c.draw_frame(), Err(FrameError::SyncWait(_))));
        assert_eq!(c.device().calls, vec![Call::Wait(0)]);
    }

    #[test]
    fn immediate_policy_recreates_on_every_resize() {
        let mut c = controller(2, WINDOW);
        assert!(c.notify_resize(RenderSize::new(800, 600)).unwrap());
        assert!(c.notify_resize(RenderSize::new(1024, 768)).unwrap());
        assert_eq!(
            c.device().calls,
            vec![
                Call::WaitIdle,
                Call::Recreate(RenderSize::new(800, 600)),
                Call::WaitIdle,
                Call::Recreate(RenderSize::new(1024, 768)),
            ]
        );
    }

    #[test]
    fn debounced_resize_is_applied_once_the_window_passes() {
        let mut c = FrameController::new(
            MockDevice::new(2),
            WINDOW,
            ResizePolicy::Debounce { frames: 3 },
        );
        assert!(c.notify_resize(RenderSize::new(900, 700)).unwrap());
        assert!(!c.notify_resize(RenderSize::new(910, 710)).unwrap());
        assert!(!c.notify_resize(RenderSize::new(920, 720)).unwrap());

        for _ in 0..3 {
            c.draw_frame().unwrap();
        }
        assert_eq!(c.device().count(|x| matches!(x, Call::Recreate(_))), 1);

        c.draw_frame().unwrap();
        let recreates: Vec<_> = c
            .device()
            .calls
            .iter()
            .filter(|x| matches!(x, Call::Recreate(_)))
            .cloned()
            .collect();
        assert_eq!(
            recreates,
            vec![
                Call::Recreate(RenderSize::new(900, 700)),
                Call::Recreate(RenderSize::new(920, 720)),
            ]
        );
    }

    #[test]
    fn every_recreate_is_preceded_by_an_idle_wait() {
        let mut c = controller(3, WINDOW);
        c.device_mut()
            .acquire_script
            .extend([Ok((0, SurfaceStatus::OutOfDate)), Ok((1, SurfaceStatus::SubOptimal))]);
        c.device_mut()
            .present_script
            .extend([Ok(SurfaceStatus::Ready), Ok(SurfaceStatus::OutOfDate)]);
        for _ in 0..4 {
            c.draw_frame().unwrap();
        }
        c.notify_resize(RenderSize::new(300, 200)).unwrap();

        let calls = &c.device().calls;
        for (i, call) in calls.iter().enumerate() {
            if matches!(call, Call::Recreate(_)) {
                assert_eq!(calls[i - 1], Call::WaitIdle);
            }
        }
        assert_eq!(c.device().count(|x| matches!(x, Call::Recreate(_))), 4);
    }

    #[test]
    fn shutdown_drains_the_device() {
        let mut c = controller(2, WINDOW);
        c.draw_frame().unwrap();
        c.shutdown().unwrap();
        assert_eq!(c.device().calls.last(), Some(&Call::WaitIdle));
    }

    #[test]
    fn policy_from_frames() {
        assert_eq!(ResizePolicy::from_frames(0), ResizePolicy::Immediate);
        assert_eq!(
            ResizePolicy::from_frames(10),
            ResizePolicy::Debounce { frames: 10 }
        );
        assert!(ResizePolicy::Debounce { frames: 10 }.allows(25, Some(15)));
        assert!(!ResizePolicy::Debounce { frames: 10 }.allows(24, Some(15)));
    }
}
