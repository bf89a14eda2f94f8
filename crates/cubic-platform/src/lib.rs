// SPDX-License-Identifier: CEPL-1.0
//! Windowing for Cubic. Re-exports winit so the app depends on one version.

pub use winit;

use anyhow::{Context, Result};
use tracing::debug;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

/// Open the main window.
pub fn create_window(event_loop: &ActiveEventLoop, title: &str) -> Result<Window> {
    let window = event_loop
        .create_window(Window::default_attributes().with_title(title))
        .context("create_window")?;
    let size = window.inner_size();
    debug!("window '{}' created at {}x{}", title, size.width, size.height);
    Ok(window)
}
