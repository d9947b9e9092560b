// Per-frame control flow
//
// The orchestrator owns the ordering of a frame and nothing else. Everything
// that touches the GPU goes through `FrameBackend`, so the sequence can be
// driven by the real Vulkan recorder or by a test double.

use anyhow::Result;
use ash::vk;
use std::time::Duration;

use super::frame::FrameRing;
use crate::uniform::UniformBufferObject;

/// GPU operations used by one frame. `slot` is the frame-in-flight index,
/// `image` the acquired swapchain image index; they need not be equal.
pub trait FrameBackend {
    /// Block until the slot's fence signals
    fn wait_for_fence(&mut self, slot: usize) -> Result<()>;
    fn reset_fence(&mut self, slot: usize) -> Result<()>;
    /// Acquire the next presentable image, signaling the slot's image-available semaphore
    fn acquire_next_image(&mut self, slot: usize) -> Result<u32>;
    /// Reset and begin the slot's command buffer, begin the render pass on the
    /// image's framebuffer and set viewport and scissor
    fn begin_frame(&mut self, slot: usize, image: u32) -> Result<()>;
    fn write_uniforms(&mut self, image: u32, ubo: &UniformBufferObject) -> Result<()>;
    fn write_descriptors(&mut self, image: u32) -> Result<()>;
    /// Bind, draw, end the render pass and the command buffer
    fn draw(&mut self, slot: usize, image: u32) -> Result<()>;
    fn submit(&mut self, slot: usize) -> Result<()>;
    fn present(&mut self, slot: usize, image: u32) -> Result<()>;
}

pub struct Orchestrator {
    ring: FrameRing,
    extent: vk::Extent2D,
}

impl Orchestrator {
    pub fn new(frames_in_flight: usize, extent: vk::Extent2D) -> Result<Self> {
        Ok(Self {
            ring: FrameRing::new(frames_in_flight)?,
            extent,
        })
    }

    pub fn current_frame(&self) -> usize {
        self.ring.current()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.ring.len()
    }

    /// Render one frame. Any error leaves the current slot where it is.
    pub fn render<B: FrameBackend>(&mut self, backend: &mut B, elapsed: Duration) -> Result<()> {
        let slot = self.ring.current();

        backend.wait_for_fence(slot)?;
        self.ring.fence_signaled()?;
        backend.reset_fence(slot)?;

        let image = backend.acquire_next_image(slot)?;

        self.ring.begin_recording()?;
        log::trace!(
            "Frame slot {} {:?} to image {}",
            slot,
            self.ring.state(slot),
            image
        );
        backend.begin_frame(slot, image)?;

        let ubo = UniformBufferObject::animated(elapsed, self.extent);
        backend.write_uniforms(image, &ubo)?;
        backend.write_descriptors(image)?;
        backend.draw(slot, image)?;

        backend.submit(slot)?;
        self.ring.submit()?;

        backend.present(slot, image)?;

        self.ring.advance();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::swapchain::{SwapchainSettings, SwapchainSupportDetails};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        WaitFence { slot: usize, was_signaled: bool },
        ResetFence(usize),
        Acquire { slot: usize, image: u32 },
        BeginFrame { slot: usize, image: u32 },
        WriteUniforms(u32),
        WriteDescriptors(u32),
        Draw { slot: usize, image: u32 },
        Submit(usize),
        Present { slot: usize, image: u32 },
    }

    /// Device whose fences signal as soon as work is submitted
    struct MockDevice {
        fences: Vec<bool>,
        image_count: u32,
        next_image: u32,
        fail_acquire: bool,
        events: Vec<Event>,
    }

    impl MockDevice {
        fn new(frames_in_flight: usize, image_count: u32) -> Self {
            Self {
                fences: vec![true; frames_in_flight],
                image_count,
                next_image: 0,
                fail_acquire: false,
                events: Vec::new(),
            }
        }
    }

    impl FrameBackend for MockDevice {
        fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
            self.events.push(Event::WaitFence {
                slot,
                was_signaled: self.fences[slot],
            });
            Ok(())
        }

        fn reset_fence(&mut self, slot: usize) -> Result<()> {
            self.fences[slot] = false;
            self.events.push(Event::ResetFence(slot));
            Ok(())
        }

        fn acquire_next_image(&mut self, slot: usize) -> Result<u32> {
            if self.fail_acquire {
                anyhow::bail!("ERROR_OUT_OF_DATE_KHR");
            }
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            self.events.push(Event::Acquire { slot, image });
            Ok(image)
        }

        fn begin_frame(&mut self, slot: usize, image: u32) -> Result<()> {
            self.events.push(Event::BeginFrame { slot, image });
            Ok(())
        }

        fn write_uniforms(&mut self, image: u32, _ubo: &UniformBufferObject) -> Result<()> {
            self.events.push(Event::WriteUniforms(image));
            Ok(())
        }

        fn write_descriptors(&mut self, image: u32) -> Result<()> {
            self.events.push(Event::WriteDescriptors(image));
            Ok(())
        }

        fn draw(&mut self, slot: usize, image: u32) -> Result<()> {
            self.events.push(Event::Draw { slot, image });
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<()> {
            self.events.push(Event::Submit(slot));
            self.fences[slot] = true;
            Ok(())
        }

        fn present(&mut self, slot: usize, image: u32) -> Result<()> {
            self.events.push(Event::Present { slot, image });
            Ok(())
        }
    }

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1280,
        height: 720,
    };

    fn frame(n: u64) -> Duration {
        Duration::from_millis(16 * n)
    }

    fn surface(present_modes: Vec<vk::PresentModeKHR>) -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                current_extent: EXTENT,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes,
        }
    }

    #[test]
    fn frame_steps_run_in_order() {
        let mut orchestrator = Orchestrator::new(2, EXTENT).unwrap();
        let mut device = MockDevice::new(2, 2);

        orchestrator.render(&mut device, frame(0)).unwrap();

        assert_eq!(
            device.events,
            vec![
                Event::WaitFence {
                    slot: 0,
                    was_signaled: true
                },
                Event::ResetFence(0),
                Event::Acquire { slot: 0, image: 0 },
                Event::BeginFrame { slot: 0, image: 0 },
                Event::WriteUniforms(0),
                Event::WriteDescriptors(0),
                Event::Draw { slot: 0, image: 0 },
                Event::Submit(0),
                Event::Present { slot: 0, image: 0 },
            ]
        );
        assert_eq!(orchestrator.current_frame(), 1);
    }

    #[test]
    fn current_frame_cycles_through_slots() {
        let mut orchestrator = Orchestrator::new(2, EXTENT).unwrap();
        let mut device = MockDevice::new(2, 2);

        let mut seen = Vec::new();
        for n in 0..7 {
            seen.push(orchestrator.current_frame());
            orchestrator.render(&mut device, frame(n)).unwrap();
        }

        assert_eq!(seen, vec![0, 1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn uniform_writes_follow_a_signaled_fence_wait() {
        let mut orchestrator = Orchestrator::new(3, EXTENT).unwrap();
        let mut device = MockDevice::new(3, 3);

        for n in 0..10 {
            orchestrator.render(&mut device, frame(n)).unwrap();
        }

        let mut last_wait = None;
        let mut writes = 0;
        for event in &device.events {
            match *event {
                Event::WaitFence { slot, was_signaled } => last_wait = Some((slot, was_signaled)),
                Event::WriteUniforms(image) => {
                    assert_eq!(last_wait, Some((image as usize, true)));
                    writes += 1;
                }
                _ => {}
            }
        }
        assert_eq!(writes, 10);
    }

    #[test]
    fn fence_reset_precedes_rerecording() {
        let mut orchestrator = Orchestrator::new(2, EXTENT).unwrap();
        let mut device = MockDevice::new(2, 2);

        for n in 0..6 {
            orchestrator.render(&mut device, frame(n)).unwrap();
        }

        for slot in 0..2 {
            let per_slot: Vec<Event> = device
                .events
                .iter()
                .copied()
                .filter(|e| match *e {
                    Event::WaitFence { slot: s, .. } | Event::ResetFence(s) | Event::Submit(s) => {
                        s == slot
                    }
                    Event::BeginFrame { slot: s, .. } => s == slot,
                    _ => false,
                })
                .collect();

            for chunk in per_slot.chunks(4) {
                assert!(matches!(chunk[0], Event::WaitFence { was_signaled: true, .. }));
                assert_eq!(chunk[1], Event::ResetFence(slot));
                assert!(matches!(chunk[2], Event::BeginFrame { .. }));
                assert_eq!(chunk[3], Event::Submit(slot));
            }
        }
    }

    #[test]
    fn image_index_need_not_match_slot() {
        let mut orchestrator = Orchestrator::new(2, EXTENT).unwrap();
        let mut device = MockDevice::new(2, 3);

        for n in 0..3 {
            orchestrator.render(&mut device, frame(n)).unwrap();
        }

        let draws: Vec<(usize, u32)> = device
            .events
            .iter()
            .filter_map(|e| match *e {
                Event::Draw { slot, image } => Some((slot, image)),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![(0, 0), (1, 1), (0, 2)]);
    }

    #[test]
    fn descriptors_rewritten_every_frame() {
        let mut orchestrator = Orchestrator::new(2, EXTENT).unwrap();
        let mut device = MockDevice::new(2, 2);

        for n in 0..5 {
            orchestrator.render(&mut device, frame(n)).unwrap();
        }

        let writes: Vec<u32> = device
            .events
            .iter()
            .filter_map(|e| match *e {
                Event::WriteDescriptors(image) => Some(image),
                _ => None,
            })
            .collect();
        assert_eq!(writes, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn failed_acquire_does_not_advance() {
        let mut orchestrator = Orchestrator::new(2, EXTENT).unwrap();
        let mut device = MockDevice::new(2, 2);

        orchestrator.render(&mut device, frame(0)).unwrap();
        device.fail_acquire = true;

        assert!(orchestrator.render(&mut device, frame(1)).is_err());
        assert_eq!(orchestrator.current_frame(), 1);
        assert!(!device
            .events
            .iter()
            .any(|e| matches!(e, Event::BeginFrame { slot: 1, .. })));
    }

    #[test]
    fn two_image_fifo_surface() {
        let details = surface(vec![vk::PresentModeKHR::FIFO]);
        let settings = SwapchainSettings::select(&details, EXTENT).unwrap();
        let image_count = details.requested_image_count();

        let orchestrator = Orchestrator::new(image_count as usize, settings.extent).unwrap();

        assert_eq!(image_count, 2);
        assert_eq!(orchestrator.frames_in_flight(), 2);
        assert_eq!(settings.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(settings.surface_format.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn two_image_mailbox_surface() {
        let details = surface(vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]);
        let settings = SwapchainSettings::select(&details, EXTENT).unwrap();

        let orchestrator =
            Orchestrator::new(details.requested_image_count() as usize, settings.extent).unwrap();

        assert_eq!(orchestrator.frames_in_flight(), 2);
        assert_eq!(settings.present_mode, vk::PresentModeKHR::MAILBOX);
    }
}
