//! Terminal user interface

pub mod dashboard;

use ratatui::layout::Rect;

/// Minimum popup size to prevent collapse
const MIN_POPUP_WIDTH: u16 = 20;
const MIN_POPUP_HEIGHT: u16 = 5;

/// Create a centered popup area with minimum size guarantees
#[must_use]
pub fn centered_popup(parent: Rect, max_width: u16, max_height: u16) -> Rect {
    let width = parent.width.min(max_width).max(MIN_POPUP_WIDTH);
    let height = parent.height.min(max_height).max(MIN_POPUP_HEIGHT);

    // If parent is too small, just use parent size
    let width = width.min(parent.width);
    let height = height.min(parent.height);

    let x = parent.width.saturating_sub(width) / 2;
    let y = parent.height.saturating_sub(height) / 2;
    Rect {
        x: parent.x + x,
        y: parent.y + y,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_popup() {
        let area = centered_popup(Rect::new(0, 0, 100, 30), 50, 5);
        assert_eq!(area, Rect::new(25, 12, 50, 5));

        let tiny = centered_popup(Rect::new(0, 0, 10, 3), 50, 5);
        assert_eq!(tiny, Rect::new(0, 0, 10, 3));
    }
}
