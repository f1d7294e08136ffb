//! Small macros shared across the daemon.

/// Log an error and continue execution (non-fatal error handling).
///
/// # Example
/// ```ignore
/// log_and_continue!(renderer.present(&target, &tex, scale, offset), "present frame");
/// ```
#[macro_export]
macro_rules! log_and_continue {
    ($expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::error!("Failed to {}: {}", $context, e);
        }
    };
}

/// Attach a buffer, damage the whole surface, request the next frame
/// callback, and commit — in the order the compositor needs to see them so
/// the callback request lands in the same commit cycle as the new content.
///
/// # Example
/// ```ignore
/// commit_buffer!(layer_surface, buffer, width, height, qh);
/// ```
#[macro_export]
macro_rules! commit_buffer {
    ($layer_surface:expr, $buffer:expr, $width:expr, $height:expr, $qh:expr) => {{
        let surface = $layer_surface.wl_surface();
        surface.attach(Some($buffer.buffer()), 0, 0);
        surface.damage_buffer(0, 0, $width as i32, $height as i32);
        surface.frame($qh, surface.clone());
        surface.commit();
    }};
}
