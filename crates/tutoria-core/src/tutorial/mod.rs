//! Tutorial domain module.

mod model;

pub use model::{MAX_DESCRIPTION_CHARS, NewTutorial, Tutorial, TutorialPatch};
