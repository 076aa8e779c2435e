//! Push button input

/// A debounced push button level.
///
/// Long and short press timing is done above this layer.
pub trait ButtonDevice {
    fn is_pressed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeButton {
        down: Cell<bool>,
    }

    impl ButtonDevice for FakeButton {
        fn is_pressed(&self) -> bool {
            self.down.get()
        }
    }

    #[test]
    fn test_level_tracks_state() {
        let button = FakeButton {
            down: Cell::new(false),
        };
        assert!(!button.is_pressed());
        button.down.set(true);
        assert!(button.is_pressed());
    }
}
