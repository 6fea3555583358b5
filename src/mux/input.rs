//! Controller state reported by the N64.
//!
//! ```text
//! ┌──────────────┬─────────┬─────────┬──────────┬──────────┬──────────┬──────────┐
//! │ buttons      │ stick x │ stick y │ cstick x │ cstick y │ analog l │ analog r │
//! │ uint16 BE    │ int8    │ int8    │ int8     │ int8     │ int8     │ int8     │
//! └──────────────┴─────────┴─────────┴──────────┴──────────┴──────────┴──────────┘
//! ```

use crate::error::{LinkError, Result};

/// Encoded size of a controller state.
pub const INPUT_SIZE: usize = 8;

/// Controller buttons, as bit masks of the button word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Button {
    A = 1 << 15,
    B = 1 << 14,
    Z = 1 << 13,
    Start = 1 << 12,
    DUp = 1 << 11,
    DDown = 1 << 10,
    DLeft = 1 << 9,
    DRight = 1 << 8,
    Y = 1 << 7,
    X = 1 << 6,
    L = 1 << 5,
    R = 1 << 4,
    CUp = 1 << 3,
    CDown = 1 << 2,
    CLeft = 1 << 1,
    CRight = 1,
}

impl Button {
    /// All buttons, most significant bit first.
    pub const ALL: [Button; 16] = [
        Button::A,
        Button::B,
        Button::Z,
        Button::Start,
        Button::DUp,
        Button::DDown,
        Button::DLeft,
        Button::DRight,
        Button::Y,
        Button::X,
        Button::L,
        Button::R,
        Button::CUp,
        Button::CDown,
        Button::CLeft,
        Button::CRight,
    ];

    #[inline]
    fn mask(self) -> u16 {
        self as u16
    }
}

/// One controller sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerInput {
    /// Raw button word.
    pub buttons: u16,
    /// Analog stick X.
    pub stick_x: i8,
    /// Analog stick Y.
    pub stick_y: i8,
    /// C-stick X.
    pub cstick_x: i8,
    /// C-stick Y.
    pub cstick_y: i8,
    /// Analog L trigger.
    pub analog_l: i8,
    /// Analog R trigger.
    pub analog_r: i8,
}

impl ControllerInput {
    /// Decode an input message body.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < INPUT_SIZE {
            return Err(LinkError::Protocol(format!(
                "controller input is {} bytes, expected {}",
                data.len(),
                INPUT_SIZE
            )));
        }
        let axis = |i: usize| i8::from_be_bytes([data[i]]);
        Ok(Self {
            buttons: u16::from_be_bytes([data[0], data[1]]),
            stick_x: axis(2),
            stick_y: axis(3),
            cstick_x: axis(4),
            cstick_y: axis(5),
            analog_l: axis(6),
            analog_r: axis(7),
        })
    }

    /// Check whether `button` is held.
    #[inline]
    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons & button.mask() != 0
    }

    /// Held buttons, most significant bit first.
    pub fn pressed(&self) -> impl Iterator<Item = Button> + '_ {
        Button::ALL.into_iter().filter(move |b| self.is_pressed(*b))
    }
}
