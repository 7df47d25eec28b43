//! Client-local action selection before submission

use tracing::debug;

use crate::ws::protocol::{
    ActionPayload, ActiveActionName, DefenseKind, PassiveObject, PassivePayload,
};

/// Passive selection, optionally a special defense still collecting picks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassiveSelection {
    /// Basic object, submittable as is
    Plain(PassiveObject),
    /// Object defense, submittable once a target is chosen
    TargetDefense { target: Option<ActiveActionName> },
    /// Action defense, submittable once two or more attacks are listed
    ComboDefense { combo: Vec<ActiveActionName> },
}

impl PassiveSelection {
    fn for_object(object: PassiveObject) -> Self {
        match object.defense_kind() {
            Some(DefenseKind::Target) => Self::TargetDefense { target: None },
            Some(DefenseKind::Combo) => Self::ComboDefense { combo: Vec::new() },
            None => Self::Plain(object),
        }
    }

    pub fn object(&self) -> PassiveObject {
        match self {
            Self::Plain(object) => *object,
            Self::TargetDefense { .. } => PassiveObject::ObjectDefense,
            Self::ComboDefense { .. } => PassiveObject::ActionDefense,
        }
    }

    pub fn defense_kind(&self) -> Option<DefenseKind> {
        self.object().defense_kind()
    }
}

/// Action being built by the local player. Exactly one variant at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Passive(PassiveSelection),
    /// Never empty; an emptied multiset collapses to no selection
    Active(Vec<ActiveActionName>),
}

impl PendingAction {
    /// Variant-specific completeness rule
    pub fn is_complete(&self) -> bool {
        match self {
            PendingAction::Passive(PassiveSelection::Plain(_)) => true,
            PendingAction::Passive(PassiveSelection::TargetDefense { target }) => target.is_some(),
            PendingAction::Passive(PassiveSelection::ComboDefense { combo }) => combo.len() >= 2,
            PendingAction::Active(actions) => !actions.is_empty(),
        }
    }

    /// Freeze into the wire payload
    pub fn to_payload(&self) -> ActionPayload {
        match self {
            PendingAction::Passive(selection) => {
                let mut payload = PassivePayload {
                    object_name: selection.object(),
                    defense_type: selection.defense_kind(),
                    target_object: None,
                    target_action: None,
                };
                match selection {
                    PassiveSelection::TargetDefense { target } => payload.target_object = *target,
                    PassiveSelection::ComboDefense { combo } => {
                        payload.target_action = Some(combo.clone())
                    }
                    PassiveSelection::Plain(_) => {}
                }
                ActionPayload::Passive(payload)
            }
            PendingAction::Active(actions) => ActionPayload::Active {
                actions: actions.clone(),
            },
        }
    }
}

/// Selection state machine for one round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSelection {
    pending: Option<PendingAction>,
}

impl ActionSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Replace any selection with a fresh passive one
    pub fn select_passive(&mut self, object: PassiveObject) {
        debug!(?object, "Passive selected");
        self.pending = Some(PendingAction::Passive(PassiveSelection::for_object(object)));
    }

    /// Feed an active action into whichever list is collecting one
    pub fn select_active(&mut self, name: ActiveActionName) {
        match &mut self.pending {
            Some(PendingAction::Passive(PassiveSelection::TargetDefense { target })) => {
                debug!(?name, "Defense target chosen");
                *target = Some(name);
            }
            Some(PendingAction::Passive(PassiveSelection::ComboDefense { combo })) => {
                debug!(?name, "Combo defense entry added");
                combo.push(name);
            }
            Some(PendingAction::Active(actions)) => {
                actions.push(name);
            }
            Some(PendingAction::Passive(PassiveSelection::Plain(_))) | None => {
                self.pending = Some(PendingAction::Active(vec![name]));
            }
        }
    }

    /// Remove one occurrence of `name`; returns false when nothing matched
    pub fn remove_active(&mut self, name: ActiveActionName) -> bool {
        let list = match &mut self.pending {
            Some(PendingAction::Active(actions)) => actions,
            Some(PendingAction::Passive(PassiveSelection::ComboDefense { combo })) => combo,
            _ => return false,
        };

        let Some(index) = list.iter().position(|a| *a == name) else {
            return false;
        };
        list.remove(index);

        if matches!(&self.pending, Some(PendingAction::Active(actions)) if actions.is_empty()) {
            self.pending = None;
        }
        true
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn can_submit(&self) -> bool {
        self.pending.as_ref().is_some_and(PendingAction::is_complete)
    }

    /// Number of times `name` appears in the active multiset or combo list
    pub fn count_of(&self, name: ActiveActionName) -> usize {
        match &self.pending {
            Some(PendingAction::Active(actions)) => actions.iter().filter(|a| **a == name).count(),
            Some(PendingAction::Passive(PassiveSelection::ComboDefense { combo })) => {
                combo.iter().filter(|a| **a == name).count()
            }
            _ => 0,
        }
    }
}
