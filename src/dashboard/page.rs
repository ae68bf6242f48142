//! Static dashboard page.

const TEMPLATE: &str = include_str!("dashboard.html");

/// Render the page for the captured port and refresh interval.
///
/// Port 0 (every port) is shown as `any`.
pub fn render(capture_port: u16, refresh_secs: u64) -> String {
    let port = match capture_port {
        0 => "any".to_string(),
        port => port.to_string(),
    };
    TEMPLATE
        .replace("{{PORT}}", &port)
        .replace("{{REFRESH_SECS}}", &refresh_secs.to_string())
        .replace("{{REFRESH_MS}}", &refresh_secs.saturating_mul(1000).to_string())
}
