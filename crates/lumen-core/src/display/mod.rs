//! Matrix rendering: frame buffer, glyphs, data screens, and the
//! connectivity animations.

pub mod anim;
pub mod font;
pub mod frame;
pub mod screens;

pub use anim::MatrixAnimator;
pub use frame::{Frame, MatrixDriver, HEIGHT, WIDTH};
