// SPDX-License-Identifier: CEPL-1.0
//! Failure taxonomy of the presentation core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    /// The adapter reports no usable surface format or present mode.
    #[error("surface incompatible: {0}")]
    SurfaceIncompatible(String),

    /// The native subsystem refused to build the presentable image set.
    #[error("presentable image creation failed: {0}")]
    PresentableImageCreation(String),

    #[error("image acquisition failed: {0}")]
    Acquire(String),

    #[error("graphics queue submission failed: {0}")]
    Submit(String),

    #[error("presentation failed: {0}")]
    Present(String),

    /// A wait on a fence (or a device idle-wait) itself failed.
    #[error("synchronization wait failed: {0}")]
    SyncWait(String),

    #[error("command recording failed")]
    Record(#[source] anyhow::Error),
}

pub type FrameResult<T> = std::result::Result<T, FrameError>;
