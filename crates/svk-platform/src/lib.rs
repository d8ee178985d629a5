// SPDX-License-Identifier: CEPL-1.0
pub mod events;

pub use events::{dispatch_window_event, WindowEvents};
pub use winit;
