//! 字节数格式化。

const UNITS: [&str; 5] = ["字节", "KB", "MB", "GB", "TB"];

/// Formats a byte count with 1024-based units and one decimal, e.g. `1.5 KB`.
pub fn format_bytes(size: u64) -> String {
    let mut value = size as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} PB")
}
