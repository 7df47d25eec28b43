//! Game modules: rule table, local selection, round views and the match store

pub mod round;
pub mod rules;
pub mod selection;
pub mod store;

pub use round::{RoundSide, RoundVerdict, RoundView};
pub use rules::{ActionOption, ActionRule, EnergyCost, OptionGroup};
pub use selection::{ActionSelection, PassiveSelection, PendingAction};
pub use store::{
    ConnectionStatus, MatchStore, RoomStatus, SelectionError, SelectorGate, StateUpdate,
};
