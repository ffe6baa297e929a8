#![forbid(unsafe_code)]

//! First-open-space placement on the container grid.

use crate::panel::{GridData, PanelMap};

/// Top-left-most position where a `width` x `height` panel fits.
///
/// Only rows where the panel could first become free are tried: the top
/// and the bottom edge of every panel. Likewise for columns with right
/// edges. A candidate may extend below the current bottom edge. When no
/// candidate fits, the panel goes at `x = 0` below every existing panel.
/// The returned `i` is empty; callers fill in the panel id.
#[must_use]
pub fn find_top_left_most_open_space(width: u32, height: u32, panels: &PanelMap, columns: u32) -> GridData {
    let width = width.clamp(1, columns.max(1));
    let placed = |x, y| GridData {
        x,
        y,
        w: width,
        h: height,
        i: String::new(),
    };

    let occupied: Vec<&GridData> = panels
        .iter()
        .filter_map(|p| p.grid_data.as_ref())
        .filter(|g| g.w > 0 && g.h > 0)
        .collect();
    let bottom = occupied
        .iter()
        .map(|g| g.y.saturating_add(g.h))
        .max()
        .unwrap_or(0);
    if bottom == 0 {
        return placed(0, 0);
    }

    let rows = edges(occupied.iter().map(|g| g.y.saturating_add(g.h)), bottom);
    let cols = edges(
        occupied.iter().map(|g| g.x.saturating_add(g.w)),
        columns.max(1) - width,
    );
    let candidate_height = height.max(1);
    for &y in &rows {
        for &x in &cols {
            let clear = occupied
                .iter()
                .all(|g| !overlaps(g, x, y, width, candidate_height));
            if clear {
                return placed(x, y);
            }
        }
    }
    placed(0, bottom)
}

/// Zero plus every edge up to `limit`, ascending and deduplicated.
fn edges(ends: impl Iterator<Item = u32>, limit: u32) -> Vec<u32> {
    let mut edges: Vec<u32> = std::iter::once(0).chain(ends.filter(|e| *e <= limit)).collect();
    edges.sort_unstable();
    edges.dedup();
    edges
}

fn overlaps(g: &GridData, x: u32, y: u32, w: u32, h: u32) -> bool {
    x < g.x.saturating_add(g.w)
        && g.x < x.saturating_add(w)
        && y < g.y.saturating_add(g.h)
        && g.y < y.saturating_add(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{ExplicitInput, PanelEntry};

    fn at(id: &str, x: u32, y: u32, w: u32, h: u32) -> PanelEntry {
        PanelEntry::new(id, "viz", ExplicitInput::new()).with_grid(GridData {
            x,
            y,
            w,
            h,
            i: id.into(),
        })
    }

    #[test]
    fn empty_grid_places_at_origin() {
        let grid = find_top_left_most_open_space(24, 15, &PanelMap::new(), 48);
        assert_eq!((grid.x, grid.y, grid.w, grid.h), (0, 0, 24, 15));
    }

    #[test]
    fn fills_gap_to_the_right() {
        let panels: PanelMap = [at("a", 0, 0, 24, 15)].into_iter().collect();
        let grid = find_top_left_most_open_space(24, 15, &panels, 48);
        assert_eq!((grid.x, grid.y), (24, 0));
    }

    #[test]
    fn taller_panel_may_extend_past_bottom() {
        let panels: PanelMap = [at("a", 0, 0, 24, 5)].into_iter().collect();
        let grid = find_top_left_most_open_space(10, 30, &panels, 48);
        assert_eq!((grid.x, grid.y), (24, 0));
    }

    #[test]
    fn finds_hole_in_lower_row() {
        let panels: PanelMap = [
            at("a", 0, 0, 48, 10),
            at("b", 0, 10, 20, 10),
            at("c", 30, 10, 18, 10),
        ]
        .into_iter()
        .collect();
        let grid = find_top_left_most_open_space(10, 10, &panels, 48);
        assert_eq!((grid.x, grid.y), (20, 10));
    }

    #[test]
    fn full_grid_places_below() {
        let panels: PanelMap = [at("a", 0, 0, 48, 12)].into_iter().collect();
        let grid = find_top_left_most_open_space(24, 15, &panels, 48);
        assert_eq!((grid.x, grid.y), (0, 12));
    }

    #[test]
    fn far_away_panel_does_not_overflow() {
        let panels: PanelMap = [at("a", 0, u32::MAX - 2, 4, 4)].into_iter().collect();
        let grid = find_top_left_most_open_space(4, 4, &panels, 48);
        assert_eq!((grid.x, grid.y), (0, 0));

        let panels: PanelMap = [at("a", 0, 0, 48, 6), at("b", 0, u32::MAX - 2, 48, 4)]
            .into_iter()
            .collect();
        let grid = find_top_left_most_open_space(4, 4, &panels, 48);
        assert_eq!((grid.x, grid.y), (0, 6));
    }

    #[test]
    fn lands_right_of_staggered_panels() {
        let panels: PanelMap = [at("a", 0, 0, 10, 4), at("b", 0, 4, 30, 4)].into_iter().collect();
        let grid = find_top_left_most_open_space(20, 4, &panels, 48);
        assert_eq!((grid.x, grid.y), (10, 0));
        let grid = find_top_left_most_open_space(40, 6, &panels, 48);
        assert_eq!((grid.x, grid.y), (0, 8));
    }

    #[test]
    fn panels_without_layout_are_ignored() {
        let panels: PanelMap = [PanelEntry::new("a", "viz", ExplicitInput::new())].into_iter().collect();
        let grid = find_top_left_most_open_space(24, 15, &panels, 48);
        assert_eq!((grid.x, grid.y), (0, 0));
    }
}
