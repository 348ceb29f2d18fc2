mod map;
mod model;

pub use map::{MapError, RockSampleMap};
pub use model::{
    RockObservation, RockSampleAction, RockSampleChange, RockSampleModel, RockSampleState,
    BAD_ROCK_PENALTY, EXIT_REWARD, GOOD_ROCK_REWARD, ILLEGAL_MOVE_PENALTY,
};
