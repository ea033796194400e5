//! Global constants for keytouch
//!
//! Consolidates timing, grid, and proximity constants
//! to eliminate magic numbers throughout the codebase.

// ============================================================================
// Timing Constants
// ============================================================================

/// A key entered for less than this long (and shorter than the previous key)
/// is treated as a slide-over; the previous key stays active on release.
pub const DEBOUNCE_TIME_MS: u64 = 70;

/// Delay before the key preview is shown
pub const DELAY_BEFORE_PREVIEW_MS: u64 = 0;

/// Delay before the key preview is hidden after the finger leaves a key
pub const DELAY_AFTER_PREVIEW_MS: u64 = 70;

// ============================================================================
// Spatial Grid Constants
// ============================================================================

/// Number of grid columns used for nearest-key lookup
pub const GRID_WIDTH: usize = 10;

/// Number of grid rows used for nearest-key lookup
pub const GRID_HEIGHT: usize = 5;

/// Total grid cells
pub const GRID_SIZE: usize = GRID_WIDTH * GRID_HEIGHT;

/// Number of key widths from the touch point to search for nearest keys
pub const SEARCH_DISTANCE: f32 = 1.4;

/// Maximum number of nearby key codes reported with proximity correction
pub const MAX_NEARBY_KEYS: usize = 12;

// ============================================================================
// Swipe Tracking Constants
// ============================================================================

/// Samples kept by the swipe velocity tracker
pub const SWIPE_NUM_PAST: usize = 4;

/// Samples older than this (relative to the newest) are dropped
pub const SWIPE_LONGEST_PAST_TIME_MS: u64 = 200;

/// Velocity units: pixels per this many milliseconds (1000 = px/s)
pub const SWIPE_VELOCITY_UNITS_MS: f32 = 1000.0;

// ============================================================================
// Combo / Redraw Constants
// ============================================================================

/// Maximum number of codes buffered in one chord
pub const MAX_COMBO_CODES: usize = 10;

/// Sentinel used by layouts for "no key" code
pub const VOID_KEY_CODE: i32 = 0;

// ============================================================================
// Popup Keyboard Constants
// ============================================================================

/// Maximum keys per row in a long-press popup keyboard
pub const POPUP_MAX_COLUMNS: usize = 10;
