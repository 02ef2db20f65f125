//! Dimension tags attached to every published metric, and the replay overlay
//! that temporarily replaces them.

use std::sync::{Mutex, MutexGuard};

use crate::config::PublisherConfig;
use crate::metric::TransferType;

/// Fully resolved tag set for one batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub platform_name: String,
    pub tool_name: String,
    pub instance_type: String,
    pub transfer_type: TransferType,
    pub encrypted: bool,
    pub replay_id: Option<u64>,
}

/// Overlay active while a backup is being replayed. Overrides every
/// configured tag and adds the replay id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayContext {
    pub transfer_type: TransferType,
    pub platform_name: String,
    pub tool_name: String,
    pub instance_type: String,
    pub encrypted: bool,
    pub replay_id: u64,
}

impl ReplayContext {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            platform_name: self.platform_name.clone(),
            tool_name: self.tool_name.clone(),
            instance_type: self.instance_type.clone(),
            transfer_type: self.transfer_type,
            encrypted: self.encrypted,
            replay_id: Some(self.replay_id),
        }
    }
}

/// Source of the tags used when a snapshot is taken.
///
/// Live tags come from configuration (transfer type can change at runtime).
/// While an [`OverlayGuard`] is alive the replay overlay wins.
#[derive(Debug)]
pub struct DimensionSource {
    platform_name: String,
    tool_name: String,
    instance_type: String,
    encrypted: bool,
    transfer_type: Mutex<TransferType>,
    overlay: Mutex<Option<ReplayContext>>,
}

impl DimensionSource {
    pub fn from_config(config: &PublisherConfig) -> Self {
        Self {
            platform_name: config.platform_name.clone(),
            tool_name: config.tool_name.clone(),
            instance_type: config.instance_type.clone(),
            encrypted: config.send_encrypted,
            transfer_type: Mutex::new(config.transfer_type),
            overlay: Mutex::new(None),
        }
    }

    fn overlay_slot(&self) -> MutexGuard<'_, Option<ReplayContext>> {
        self.overlay.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_transfer_type(&self, transfer_type: TransferType) {
        *self.transfer_type.lock().unwrap_or_else(|e| e.into_inner()) = transfer_type;
    }

    /// Tags from configuration, ignoring any overlay.
    pub fn live(&self) -> Dimensions {
        Dimensions {
            platform_name: self.platform_name.clone(),
            tool_name: self.tool_name.clone(),
            instance_type: self.instance_type.clone(),
            transfer_type: *self.transfer_type.lock().unwrap_or_else(|e| e.into_inner()),
            encrypted: self.encrypted,
            replay_id: None,
        }
    }

    /// Tags to apply right now.
    pub fn resolve(&self) -> Dimensions {
        match self.overlay_slot().as_ref() {
            Some(ctx) => ctx.dimensions(),
            None => self.live(),
        }
    }

    pub fn overlay(&self) -> Option<ReplayContext> {
        self.overlay_slot().clone()
    }

    /// Install a replay overlay. It is removed when the guard drops.
    pub fn install_overlay(&self, ctx: ReplayContext) -> OverlayGuard<'_> {
        *self.overlay_slot() = Some(ctx);
        OverlayGuard { source: self }
    }
}

/// Clears the replay overlay on drop.
#[must_use = "the overlay is cleared as soon as the guard is dropped"]
pub struct OverlayGuard<'a> {
    source: &'a DimensionSource,
}

impl Drop for OverlayGuard<'_> {
    fn drop(&mut self) {
        self.source.overlay_slot().take();
    }
}
