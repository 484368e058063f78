use std::time::Duration;

use ratatui_image::picker::{Picker, ProtocolType, cap_parser::QueryStdioOptions};

/// What the environment says about the outer terminal's graphics support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphicsHint {
    Kitty,
    Iterm,
    Tmux,
    None,
}

fn env_set(key: &str) -> bool {
    std::env::var(key).ok().is_some_and(|v| !v.trim().is_empty())
}

fn env_contains(key: &str, needle: &str) -> bool {
    std::env::var(key).ok().is_some_and(|v| v.contains(needle))
}

fn graphics_hint() -> GraphicsHint {
    // `KITTY_WINDOW_ID` is not forwarded over SSH, `TERM` is.
    let kitty = env_set("KITTY_WINDOW_ID")
        || std::env::var("TERM")
            .ok()
            .is_some_and(|term| term.trim().starts_with("xterm-kitty"));
    if kitty {
        return GraphicsHint::Kitty;
    }

    if env_set("ITERM_SESSION_ID")
        || env_contains("TERM_PROGRAM", "iTerm")
        || env_contains("LC_TERMINAL", "iTerm")
    {
        return GraphicsHint::Iterm;
    }

    if std::env::var_os("TMUX").is_some() {
        return GraphicsHint::Tmux;
    }

    GraphicsHint::None
}

pub(crate) fn should_query_stdio() -> bool {
    graphics_hint() != GraphicsHint::None
}

pub(crate) fn stdio_query_timeout() -> Duration {
    match graphics_hint() {
        GraphicsHint::Kitty | GraphicsHint::Iterm => Duration::from_millis(1500),
        // Passthrough may be disabled; don't stall startup.
        GraphicsHint::Tmux => Duration::from_millis(300),
        GraphicsHint::None => Duration::from_millis(0),
    }
}

fn ensure_tmux_allow_passthrough() {
    if std::env::var_os("TMUX").is_none() {
        return;
    }

    let _ = std::process::Command::new("tmux")
        .args(["set-option", "-g", "allow-passthrough", "on"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
}

/// Must be called after the terminal entered raw mode: querying reads the
/// terminal's reply from stdin.
pub(crate) fn build_picker() -> Picker {
    ensure_tmux_allow_passthrough();
    let mut picker = if should_query_stdio() {
        let mut options = QueryStdioOptions::default();
        options.timeout = stdio_query_timeout();
        options.text_sizing_protocol = false;
        Picker::from_query_stdio_with_options(options).unwrap_or_else(|_| Picker::halfblocks())
    } else {
        Picker::halfblocks()
    };
    picker.set_background_color(image::Rgba([255u8, 255u8, 255u8, 255u8]));
    tracing::info!(protocol = protocol_label(&picker), "image protocol selected");
    picker
}

pub(crate) fn protocol_label(picker: &Picker) -> &'static str {
    match picker.protocol_type() {
        ProtocolType::Halfblocks => "halfblocks",
        ProtocolType::Sixel => "sixel",
        ProtocolType::Kitty => "kitty",
        ProtocolType::Iterm2 => "iterm2",
    }
}
