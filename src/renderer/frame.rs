// Frame resources - one slot per frame in flight
//
// A slot owns a command buffer and its synchronization objects. The ring
// tracks which slot is current and where each slot is in its lifecycle:
//
//   Idle ──acquire──> Recording ──submit──> InFlight ──fence wait──> Idle

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use crate::backend::command::allocate_primary_command_buffers;
use crate::backend::{DeviceContext, FrameSync};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence signaled, nothing pending
    Idle,
    /// Image acquired, command buffer being recorded
    Recording,
    /// Submitted, fence not yet observed signaled
    InFlight,
}

/// Lifecycle bookkeeping for the frame slots
#[derive(Debug)]
pub struct FrameRing {
    states: Vec<SlotState>,
    current: usize,
}

impl FrameRing {
    pub fn new(frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            anyhow::bail!("At least one frame in flight is required");
        }
        Ok(Self {
            states: vec![SlotState::Idle; frames_in_flight],
            current: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }

    /// The current slot's fence was waited on: whatever it submitted is done
    pub fn fence_signaled(&mut self) -> Result<()> {
        match self.states[self.current] {
            SlotState::Recording => {
                anyhow::bail!("Frame slot {} is still recording", self.current)
            }
            SlotState::Idle | SlotState::InFlight => {
                self.states[self.current] = SlotState::Idle;
                Ok(())
            }
        }
    }

    pub fn begin_recording(&mut self) -> Result<()> {
        self.transition(SlotState::Idle, SlotState::Recording)
    }

    pub fn submit(&mut self) -> Result<()> {
        self.transition(SlotState::Recording, SlotState::InFlight)
    }

    /// Move to the next slot, wrapping around
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.states.len();
    }

    fn transition(&mut self, from: SlotState, to: SlotState) -> Result<()> {
        let state = &mut self.states[self.current];
        if *state != from {
            anyhow::bail!(
                "Frame slot {} cannot go {:?} -> {:?} from {:?}",
                self.current,
                from,
                to,
                state
            );
        }
        *state = to;
        Ok(())
    }
}

/// GPU objects for one frame in flight
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub sync: FrameSync,
    ctx: Arc<DeviceContext>,
}

impl FrameSlot {
    pub fn new(ctx: &Arc<DeviceContext>) -> Result<Self> {
        let command_buffer = allocate_primary_command_buffers(ctx, 1)?
            .into_iter()
            .next()
            .context("Driver returned no command buffer")?;

        let sync = match FrameSync::new(&ctx.device) {
            Ok(sync) => sync,
            Err(e) => {
                unsafe { ctx.device.free_command_buffers(ctx.command_pool, &[command_buffer]) };
                return Err(e);
            }
        };

        Ok(Self {
            command_buffer,
            sync,
            ctx: Arc::clone(ctx),
        })
    }

    pub fn create_all(ctx: &Arc<DeviceContext>, count: usize) -> Result<Vec<Self>> {
        let slots = (0..count)
            .map(|_| Self::new(ctx))
            .collect::<Result<Vec<_>>>()?;

        log::info!("Created {} frame slots", slots.len());
        Ok(slots)
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        self.sync.destroy(&self.ctx.device);
        unsafe {
            self.ctx
                .device
                .free_command_buffers(self.ctx.command_pool, &[self.command_buffer]);
        }
    }
}
