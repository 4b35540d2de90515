//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Fit `source` inside a `bound` box, preserving aspect ratio.
///
/// If the source already fits, it is returned unchanged; images are never
/// upscaled. Otherwise both edges are multiplied by
/// `min(bound_w / w, bound_h / h)` and floored, with a floor of 1px so a
/// degenerate sliver never collapses to zero.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `bound` - Maximum allowed dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Constrained dimensions
///
/// # Examples
/// ```text
/// (4000, 3000) in (2048, 2048) → (2048, 1536)
/// (1000, 800)  in (2048, 2048) → (1000, 800)
/// ```
pub fn calculate_constrained_dimensions(source: (u32, u32), bound: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bound;

    if src_w <= max_w && src_h <= max_h {
        return source;
    }

    // Compare max_w/src_w against max_h/src_h by cross-multiplying, and
    // scale in integers so the limiting edge lands exactly on the bound.
    let (src_w64, src_h64) = (src_w as u64, src_h as u64);
    let (max_w64, max_h64) = (max_w as u64, max_h as u64);
    let (w, h) = if max_w64 * src_h64 <= max_h64 * src_w64 {
        (max_w64, src_h64 * max_w64 / src_w64)
    } else {
        (src_w64 * max_h64 / src_h64, max_h64)
    };
    (
        (w as u32).clamp(1, src_w.max(1)),
        (h as u32).clamp(1, src_h.max(1)),
    )
}

/// Largest centered region of `aspect` (width / height) inside `source`.
///
/// Returns `(x, y, width, height)`. One edge always matches the source
/// exactly; the other is floored.
pub fn calculate_center_crop(source: (u32, u32), aspect: f64) -> (u32, u32, u32, u32) {
    let (src_w, src_h) = source;
    let src_aspect = src_w as f64 / src_h as f64;

    let (w, h) = if src_aspect > aspect {
        // Source is wider: keep full height, trim the sides
        let w = (floor_lenient(src_h as f64 * aspect) as u32).clamp(1, src_w);
        (w, src_h)
    } else {
        // Source is taller: keep full width, trim top and bottom
        let h = (floor_lenient(src_w as f64 / aspect) as u32).clamp(1, src_h);
        (src_w, h)
    };

    ((src_w - w) / 2, (src_h - h) / 2, w, h)
}

/// Floor that tolerates float error just below an integer (899.9999999 → 900).
fn floor_lenient(value: f64) -> f64 {
    (value + 1e-6).floor()
}
