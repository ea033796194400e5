//! Keyboard
//!
//! Owns the keys of one layout, the spatial grid used for nearest-key
//! lookup, and the modifier state shared by its modifier keys.
//!
//! ## Spatial grid
//!
//! The keyboard area is divided into `GRID_WIDTH x GRID_HEIGHT` cells. Each
//! cell stores the indices of keys that overlap it or lie within the
//! proximity threshold of one of its corners, so a lookup only tests a
//! handful of candidates. The grid is rebuilt whenever key geometry changes.

use std::collections::HashMap;

use log::debug;
use smol_str::SmolStr;
use unicode_segmentation::UnicodeSegmentation;

use super::event::{Event, Modifiers};
use super::key::{EngineState, GestureType, Key};
use super::modifier::ModifierState;
use crate::config::{KeyConfig, LayoutConfig, PresetKey};
use crate::constants::{GRID_HEIGHT, GRID_SIZE, GRID_WIDTH, MAX_NEARBY_KEYS, SEARCH_DISTANCE};
use crate::error::LayoutError;
use crate::geometry::{EdgeFlags, Point, Rect};

/// Result of resolving a touch point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyHit {
    /// Key under the point (or closest, with proximity correction)
    pub key: Option<usize>,
    /// Codes of nearby keys, closest first (proximity correction only)
    pub nearby: Vec<i32>,
}

/// Precomputed nearest-key candidates per grid cell
#[derive(Debug, Clone, Default)]
struct NeighborGrid {
    cell_width: i32,
    cell_height: i32,
    cells: Vec<Vec<usize>>,
}

/// A set of keys with geometry, grid and modifier state
#[derive(Debug, Clone)]
pub struct Keyboard {
    name: SmolStr,
    keys: Vec<Key>,
    /// Width covered by keys
    min_width: i32,
    height: i32,
    proximity_threshold: i64,
    grid: NeighborGrid,
    modifiers: ModifierState,
    ascii_mode: bool,
    uppercase_labels: bool,
    /// Layout this keyboard was built from (for re-layout on resize)
    source: Option<LayoutConfig>,
}

impl Keyboard {
    /// Build a keyboard from explicitly placed keys
    pub fn new(name: &str, keys: Vec<Key>) -> Self {
        let min_width = keys
            .iter()
            .map(|k| k.rect.right() + k.gap / 2)
            .max()
            .unwrap_or(0);
        let height = keys.iter().map(|k| k.rect.bottom()).max().unwrap_or(0);
        let mut keyboard = Self {
            name: SmolStr::new(name),
            keys,
            min_width,
            height,
            proximity_threshold: 0,
            grid: NeighborGrid::default(),
            modifiers: ModifierState::new(),
            ascii_mode: false,
            uppercase_labels: false,
            source: None,
        };
        keyboard.rebuild_grid();
        keyboard
    }

    /// Lay out a keyboard from a layout file for the given display width.
    ///
    /// Keys flow left to right and wrap when the column limit or the
    /// display width is reached. A key without a tap binding is a spacer.
    pub fn from_config(config: &LayoutConfig, display_width: i32) -> Result<Self, LayoutError> {
        if display_width <= 0 {
            return Err(LayoutError::InvalidWidth(display_width));
        }

        let hgap = config.horizontal_gap;
        let vgap = config.vertical_gap;
        let mut keys: Vec<Key> = Vec::with_capacity(config.keys.len());
        let mut x = hgap / 2;
        let mut y = vgap;
        let mut row = 0usize;
        let mut column = 0usize;
        let mut row_height = config.height;

        for (index, kc) in config.keys.iter().enumerate() {
            let mut width = percent_px(kc.width.unwrap_or(config.width), display_width) - hgap;
            let height = kc.height.unwrap_or(config.height);

            if column >= config.columns.max(1) || x + width > display_width {
                if let Some(last) = keys.last_mut().filter(|k| k.row == row) {
                    last.edge_flags |= EdgeFlags::RIGHT;
                }
                x = hgap / 2;
                y += vgap + row_height;
                column = 0;
                row += 1;
                row_height = height;
            } else if column == 0 {
                row_height = height;
            } else {
                row_height = row_height.max(height);
            }

            if kc.is_spacer() {
                x += width + hgap;
                continue;
            }

            // Absorb rounding so the last key in a row reaches the edge
            let rest = display_width - x - width - hgap / 2;
            if rest.abs() <= display_width / 100 {
                width = display_width - x - hgap / 2;
            }
            if width <= 0 || height <= 0 {
                return Err(LayoutError::InvalidKeySize {
                    index,
                    width,
                    height,
                });
            }

            let mut key = build_key(kc, Rect::new(x, y, width, height), hgap, &config.preset_keys);
            key.row = row;
            key.column = column;
            if column == 0 {
                key.edge_flags |= EdgeFlags::LEFT;
            }
            if row == 0 {
                key.edge_flags |= EdgeFlags::TOP;
            }
            keys.push(key);

            column += 1;
            x += width + hgap;
        }

        if keys.is_empty() {
            return Err(LayoutError::NoKeys(config.name.clone()));
        }
        if let Some(last) = keys.last_mut() {
            last.edge_flags |= EdgeFlags::RIGHT;
        }
        for key in keys.iter_mut().filter(|k| k.row == row) {
            key.edge_flags |= EdgeFlags::BOTTOM;
        }

        let mut keyboard = Self::new(&config.name, keys);
        keyboard.height = y + row_height + vgap;
        keyboard.ascii_mode = config.ascii_mode;
        keyboard.uppercase_labels = config.uppercase_labels();
        keyboard.source = Some(config.clone());
        keyboard.rebuild_grid();

        debug!(
            "Keyboard '{}' laid out: {} keys, {}x{}",
            keyboard.name,
            keyboard.keys.len(),
            keyboard.min_width,
            keyboard.height
        );
        Ok(keyboard)
    }

    /// Build a popup keyboard offering one key per grapheme of `characters`
    pub fn from_characters(
        characters: &str,
        columns: usize,
        key_width: i32,
        key_height: i32,
        gap: i32,
    ) -> Self {
        let presets = HashMap::new();
        let graphemes: Vec<&str> = characters.graphemes(true).collect();
        let columns = if columns == 0 {
            graphemes.len().max(1)
        } else {
            columns
        };
        let rows = graphemes.len().div_ceil(columns);

        let keys = graphemes
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let row = i / columns;
                let column = i % columns;
                let rect = Rect::new(
                    gap / 2 + column as i32 * (key_width + gap),
                    gap / 2 + row as i32 * (key_height + gap),
                    key_width,
                    key_height,
                );
                let mut key = Key::new(rect)
                    .with_gap(gap)
                    .with_event(GestureType::Click, Event::parse(g, &presets).with_label(g));
                key.row = row;
                key.column = column;
                let last_column = column + 1 == columns || i + 1 == graphemes.len();
                let flags = [
                    (column == 0, EdgeFlags::LEFT),
                    (last_column, EdgeFlags::RIGHT),
                    (row == 0, EdgeFlags::TOP),
                    (row + 1 == rows, EdgeFlags::BOTTOM),
                ];
                for (set, flag) in flags {
                    if set {
                        key.edge_flags |= flag;
                    }
                }
                key
            })
            .collect();

        let mut keyboard = Self::new(characters, keys);
        keyboard.height = rows as i32 * (key_height + gap);
        keyboard.rebuild_grid();
        keyboard
    }

    /// Re-run the layout for a new display width.
    ///
    /// Keyboards not built from a layout file keep their geometry.
    pub fn relayout(&mut self, display_width: i32) -> Result<(), LayoutError> {
        let Some(source) = self.source.take() else {
            return Ok(());
        };
        let rebuilt = Self::from_config(&source, display_width);
        match rebuilt {
            Ok(mut keyboard) => {
                keyboard.modifiers = self.modifiers;
                keyboard.sync_modifier_keys();
                *self = keyboard;
                Ok(())
            }
            Err(e) => {
                self.source = Some(source);
                Err(e)
            }
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn key(&self, index: usize) -> Option<&Key> {
        self.keys.get(index)
    }

    pub fn key_mut(&mut self, index: usize) -> Option<&mut Key> {
        self.keys.get_mut(index)
    }

    pub fn min_width(&self) -> i32 {
        self.min_width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.min_width, self.height)
    }

    pub fn is_ascii_mode(&self) -> bool {
        self.ascii_mode
    }

    pub fn proximity_threshold(&self) -> i64 {
        self.proximity_threshold
    }

    /// Keys whose output depends on the engine composing
    pub fn composing_keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.has_state_bindings())
            .map(|(i, _)| i)
    }

    /// Label to draw for a key under the current modifier state
    pub fn key_label(&self, index: usize, state: &EngineState) -> SmolStr {
        self.keys
            .get(index)
            .map(|k| k.label(state, self.modifiers.active(), self.uppercase_labels))
            .unwrap_or_default()
    }

    // ========================================================================
    // Spatial lookup
    // ========================================================================

    /// Recompute the proximity threshold and the neighbor grid
    pub fn rebuild_grid(&mut self) {
        self.proximity_threshold = self.compute_proximity_threshold();

        let cell_width = ((self.min_width + GRID_WIDTH as i32 - 1) / GRID_WIDTH as i32).max(1);
        let cell_height = ((self.height + GRID_HEIGHT as i32 - 1) / GRID_HEIGHT as i32).max(1);
        let mut cells = Vec::with_capacity(GRID_SIZE);

        for gy in 0..GRID_HEIGHT as i32 {
            for gx in 0..GRID_WIDTH as i32 {
                let cell = Rect::new(gx * cell_width, gy * cell_height, cell_width, cell_height);
                let corners = [
                    Point::new(cell.x, cell.y),
                    Point::new(cell.right() - 1, cell.y),
                    Point::new(cell.x, cell.bottom() - 1),
                    Point::new(cell.right() - 1, cell.bottom() - 1),
                ];
                let indices: Vec<usize> = self
                    .keys
                    .iter()
                    .enumerate()
                    .filter(|(_, key)| {
                        key.rect.intersects(&cell)
                            || corners.iter().any(|&c| {
                                key.squared_distance_from(c) < self.proximity_threshold
                                    || key.is_inside(c)
                            })
                    })
                    .map(|(i, _)| i)
                    .collect();
                cells.push(indices);
            }
        }

        self.grid = NeighborGrid {
            cell_width,
            cell_height,
            cells,
        };
    }

    /// Average (smaller key dimension + gap), scaled by the search distance, squared
    fn compute_proximity_threshold(&self) -> i64 {
        if self.keys.is_empty() {
            return 0;
        }
        let total: i64 = self
            .keys
            .iter()
            .map(|k| (k.rect.width.min(k.rect.height) + k.gap) as i64)
            .sum();
        let average = total as f32 / self.keys.len() as f32;
        let distance = (average * SEARCH_DISTANCE) as i64;
        distance * distance
    }

    /// Grid candidates for a point (empty outside the keyboard)
    fn candidates(&self, p: Point) -> &[usize] {
        if p.x < 0 || p.y < 0 || p.x >= self.min_width || p.y >= self.height {
            return &[];
        }
        let gx = (p.x / self.grid.cell_width) as usize;
        let gy = (p.y / self.grid.cell_height) as usize;
        if gx >= GRID_WIDTH || gy >= GRID_HEIGHT {
            return &[];
        }
        self.grid
            .cells
            .get(gy * GRID_WIDTH + gx)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Keys containing or within the proximity threshold of `p`, closest first
    pub fn nearest_keys(&self, p: Point) -> Vec<usize> {
        let mut found: Vec<(i64, usize)> = self
            .candidates(p)
            .iter()
            .filter_map(|&i| {
                let key = &self.keys[i];
                let dist = key.squared_distance_from(p);
                (key.is_inside(p) || dist < self.proximity_threshold).then_some((dist, i))
            })
            .collect();
        found.sort();
        found.into_iter().map(|(_, i)| i).collect()
    }

    /// Key whose rectangle (edge-extended) contains `p`
    pub fn primary_key_at(&self, p: Point) -> Option<usize> {
        self.candidates(p)
            .iter()
            .copied()
            .find(|&i| self.keys[i].is_inside(p))
    }

    /// Resolve a point to a key.
    ///
    /// With `proximity`, a point in a gap resolves to the closest key in
    /// range and nearby key codes are reported.
    pub fn resolve(&self, p: Point, proximity: bool) -> KeyHit {
        let primary = self.primary_key_at(p);
        if !proximity {
            return KeyHit {
                key: primary,
                nearby: Vec::new(),
            };
        }

        let nearest = self.nearest_keys(p);
        let nearby = nearest
            .iter()
            .map(|&i| self.keys[i].code())
            .filter(|&code| code != 0)
            .take(MAX_NEARBY_KEYS)
            .collect();
        KeyHit {
            key: primary.or_else(|| nearest.first().copied()),
            nearby,
        }
    }

    // ========================================================================
    // Modifiers
    // ========================================================================

    pub fn modifiers(&self) -> &ModifierState {
        &self.modifiers
    }

    /// Modifier mask applied to the next emitted key
    pub fn active_modifiers(&self) -> Modifiers {
        self.modifiers.active()
    }

    /// Tap on a modifier key; `latch` toggles its lock instead
    pub fn click_modifier(&mut self, index: usize, latch: bool) {
        let Some(mask) = self.keys.get(index).map(|k| k.modifier_mask()) else {
            return;
        };
        if mask.is_empty() {
            return;
        }
        self.modifiers.click(mask, latch);
        self.sync_modifier_keys();
    }

    /// Lock or unlock a modifier (long-press latch)
    pub fn latch_modifier(&mut self, mask: Modifiers, on: bool) {
        self.modifiers.latch(mask, on);
        self.sync_modifier_keys();
    }

    /// Set Shift, one-shot or latched
    pub fn set_shifted(&mut self, on: bool, latch: bool) {
        if latch {
            self.modifiers.latch(Modifiers::SHIFT, on);
        } else {
            self.modifiers.set(Modifiers::SHIFT, on);
        }
        self.sync_modifier_keys();
    }

    /// Clear one-shot modifiers after an emission
    pub fn refresh_modifiers(&mut self) -> bool {
        let changed = self.modifiers.refresh();
        if changed {
            self.sync_modifier_keys();
        }
        changed
    }

    /// Clear all modifiers, latched included
    pub fn reset_modifiers(&mut self) -> bool {
        let changed = self.modifiers.clear();
        if changed {
            self.sync_modifier_keys();
        }
        changed
    }

    pub fn needs_upper_case(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }

    pub fn is_only_shift_on(&self) -> bool {
        self.modifiers.is_only_shift()
    }

    /// Show modifier keys as on while their modifier is latched
    fn sync_modifier_keys(&mut self) {
        for key in self.keys.iter_mut().filter(|k| k.is_modifier()) {
            let on = self.modifiers.is_latched(key.modifier_mask());
            key.set_on(on);
        }
    }
}

/// Percent of the display width, in pixels
fn percent_px(percent: f32, display_width: i32) -> i32 {
    (percent * display_width as f32 / 100.0).round() as i32
}

fn build_key(kc: &KeyConfig, rect: Rect, gap: i32, presets: &HashMap<String, PresetKey>) -> Key {
    let mut key = Key::new(rect).with_gap(gap);
    for (gesture, binding) in kc.bindings() {
        key = key.with_event(gesture, Event::parse(binding, presets));
    }
    if let Some(send) = kc.send_bindings {
        key = key.with_send_bindings(send);
    }
    if let Some(label) = &kc.label {
        key = key.with_label(label);
    }
    if let Some(hint) = &kc.hint {
        key = key.with_hint(hint);
    }
    if let Some(popup) = &kc.popup {
        key = key.with_popup(popup);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::keycode::*;

    fn two_keys() -> Keyboard {
        let a = Key::new(Rect::new(0, 0, 50, 50))
            .with_event(GestureType::Click, Event::key(KEYCODE_A));
        let b = Key::new(Rect::new(54, 0, 50, 50))
            .with_event(GestureType::Click, Event::key(KEYCODE_A + 1));
        Keyboard::new("two", vec![a, b])
    }

    fn builtin() -> Keyboard {
        Keyboard::from_config(&LayoutConfig::builtin(), 1080).unwrap()
    }

    #[test]
    fn test_primary_key_and_gap() {
        let kb = two_keys();
        assert_eq!(kb.primary_key_at(Point::new(10, 10)), Some(0));
        assert_eq!(kb.primary_key_at(Point::new(60, 10)), Some(1));
        // In the gap between the keys
        assert_eq!(kb.primary_key_at(Point::new(52, 10)), None);
    }

    #[test]
    fn test_nearest_keys_in_gap_ordered_by_distance() {
        let kb = two_keys();
        // Slightly closer to key 1's center (79) than key 0's (25)
        let nearest = kb.nearest_keys(Point::new(53, 25));
        assert_eq!(nearest, vec![1, 0]);
        let nearest = kb.nearest_keys(Point::new(51, 25));
        assert_eq!(nearest, vec![0, 1]);
    }

    #[test]
    fn test_outside_keyboard_is_empty() {
        let kb = two_keys();
        assert!(kb.nearest_keys(Point::new(-1, 10)).is_empty());
        assert!(kb.nearest_keys(Point::new(10, 500)).is_empty());
        assert_eq!(kb.primary_key_at(Point::new(2000, 10)), None);
    }

    #[test]
    fn test_resolve_with_proximity() {
        let kb = two_keys();
        let hit = kb.resolve(Point::new(51, 25), true);
        assert_eq!(hit.key, Some(0));
        assert_eq!(hit.nearby, vec![KEYCODE_A, KEYCODE_A + 1]);

        let hit = kb.resolve(Point::new(51, 25), false);
        assert_eq!(hit.key, None);
        assert!(hit.nearby.is_empty());
    }

    #[test]
    fn test_builtin_layout_rows_and_edges() {
        let kb = builtin();
        // 35 entries minus two spacers
        assert_eq!(kb.keys().len(), 33);
        let q = &kb.keys()[0];
        assert_eq!(q.code(), KEYCODE_A + 16);
        assert_eq!(q.row(), 0);
        assert!(q.edge_flags().contains(EdgeFlags::LEFT | EdgeFlags::TOP));

        let p = &kb.keys()[9];
        assert_eq!(p.row(), 0);
        assert!(p.edge_flags().contains(EdgeFlags::RIGHT));
        assert_eq!(p.rect().right(), 1080 - 2);

        // 'a' follows a spacer but still starts its row
        let a = &kb.keys()[10];
        assert_eq!(a.code(), KEYCODE_A);
        assert_eq!(a.row(), 1);
        assert_eq!(a.column(), 0);
        assert!(a.edge_flags().contains(EdgeFlags::LEFT));
        assert!(a.rect().x > 50);

        let last = kb.keys().last().unwrap();
        assert_eq!(last.row(), 3);
        assert!(last
            .edge_flags()
            .contains(EdgeFlags::RIGHT | EdgeFlags::BOTTOM));
        assert_eq!(kb.min_width(), 1080);
    }

    #[test]
    fn test_edge_key_claims_gap_at_border() {
        let kb = builtin();
        let a = &kb.keys()[10];
        // Left of 'a', inside the leading spacer
        let p = Point::new(5, a.rect().center().y);
        assert_eq!(kb.primary_key_at(p), Some(10));
    }

    #[test]
    fn test_every_key_center_resolves_to_itself() {
        let kb = builtin();
        for (i, key) in kb.keys().iter().enumerate() {
            assert_eq!(kb.primary_key_at(key.rect().center()), Some(i));
            assert_eq!(kb.nearest_keys(key.rect().center()).first(), Some(&i));
        }
    }

    #[test]
    fn test_invalid_width() {
        let err = Keyboard::from_config(&LayoutConfig::builtin(), 0).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidWidth(0)));
    }

    #[test]
    fn test_relayout_keeps_modifiers() {
        let mut kb = builtin();
        kb.latch_modifier(Modifiers::SHIFT, true);
        kb.relayout(720).unwrap();
        assert_eq!(kb.keys()[9].rect().right(), 720 - 2);
        assert!(kb.needs_upper_case());
        let shift = kb.keys().iter().find(|k| k.is_modifier()).unwrap();
        assert!(shift.is_on());
    }

    #[test]
    fn test_popup_from_characters() {
        let kb = Keyboard::from_characters("eéè", 0, 40, 50, 4);
        assert_eq!(kb.keys().len(), 3);
        assert_eq!(kb.keys()[0].code(), KEYCODE_A + 4);
        assert_eq!(kb.keys()[1].click().unwrap().text_value(), Some("é"));
        assert_eq!(kb.keys()[1].click().unwrap().label(), "é");
        assert!(kb.keys()[2].edge_flags().contains(EdgeFlags::RIGHT));
        assert_eq!(kb.min_width(), 3 * 44);
    }

    #[test]
    fn test_popup_wraps_graphemes() {
        // Combining sequence counts as one key
        let kb = Keyboard::from_characters("ab\u{0065}\u{0301}cd", 2, 40, 50, 4);
        assert_eq!(kb.keys().len(), 5);
        assert_eq!(kb.keys()[2].click().unwrap().text_value(), Some("e\u{0301}"));
        assert_eq!(kb.keys()[4].row(), 2);
        assert!(kb.keys()[4].edge_flags().contains(EdgeFlags::BOTTOM));
    }

    #[test]
    fn test_modifier_click_syncs_keys() {
        let mut kb = builtin();
        let shift = kb.keys().iter().position(|k| k.is_modifier()).unwrap();
        kb.click_modifier(shift, false);
        assert!(kb.needs_upper_case());
        assert!(kb.is_only_shift_on());
        assert!(!kb.keys()[shift].is_on());
        assert!(kb.refresh_modifiers());
        assert!(!kb.needs_upper_case());

        kb.click_modifier(shift, true);
        assert!(kb.keys()[shift].is_on());
        assert!(!kb.refresh_modifiers());
        assert!(kb.reset_modifiers());
        assert!(!kb.keys()[shift].is_on());
    }

    #[test]
    fn test_key_label_with_shift() {
        let mut kb = builtin();
        let state = EngineState::default();
        assert_eq!(kb.key_label(0, &state), "q");
        kb.set_shifted(true, false);
        assert_eq!(kb.key_label(0, &state), "Q");
    }
}
