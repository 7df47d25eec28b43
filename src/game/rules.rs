//! Action rule table - costs, labels, and combination locks

use crate::ws::protocol::{ActiveActionName, PassiveObject};

use super::selection::{PassiveSelection, PendingAction};

/// Energy required to play an option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyCost {
    Free,
    Fixed(u32),
    /// Consumes whatever energy the player holds
    Drain,
}

/// Option groups that lock each other out in the selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionGroup {
    PlainPassive,
    Active,
    SpecialDefense,
}

/// A selectable option in the action selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOption {
    Passive(PassiveObject),
    Active(ActiveActionName),
}

impl ActionOption {
    pub fn group(self) -> OptionGroup {
        match self {
            ActionOption::Active(_) => OptionGroup::Active,
            ActionOption::Passive(object) if object.defense_kind().is_some() => {
                OptionGroup::SpecialDefense
            }
            ActionOption::Passive(_) => OptionGroup::PlainPassive,
        }
    }

    pub fn rule(self) -> ActionRule {
        match self {
            ActionOption::Passive(object) => ActionRule::for_passive(object),
            ActionOption::Active(name) => ActionRule::for_active(name),
        }
    }
}

/// Static rule entry for one option
#[derive(Debug, Clone, Copy)]
pub struct ActionRule {
    pub label: &'static str,
    pub effect: &'static str,
    pub cost: EnergyCost,
}

impl ActionRule {
    pub fn for_active(name: ActiveActionName) -> Self {
        match name {
            ActiveActionName::Sa => Self {
                label: "Sa",
                effect: "attack 1 [normal], defense 5",
                cost: EnergyCost::Fixed(1),
            },
            ActiveActionName::Tin => Self {
                label: "Tin",
                effect: "attack 3 [normal], defense 1",
                cost: EnergyCost::Fixed(1),
            },
            ActiveActionName::NanMan => Self {
                label: "NanMan",
                effect: "attack 3 [penetrate], defense 5",
                cost: EnergyCost::Fixed(3),
            },
            ActiveActionName::DaShan => Self {
                label: "DaShan",
                effect: "attack 4 [penetrate], defense 5",
                cost: EnergyCost::Fixed(4),
            },
            ActiveActionName::WanJian => Self {
                label: "WanJian",
                effect: "attack 2 [bulletproof], defense 5",
                cost: EnergyCost::Fixed(3),
            },
            ActiveActionName::Nuclear => Self {
                label: "Nuclear",
                effect: "attack 5 [nuclear], defense 6",
                cost: EnergyCost::Fixed(5),
            },
        }
    }

    pub fn for_passive(object: PassiveObject) -> Self {
        match object {
            PassiveObject::Cake => Self {
                label: "Cake",
                effect: "gain 1 energy, damage multiplier x1",
                cost: EnergyCost::Free,
            },
            PassiveObject::Pouch => Self {
                label: "Pouch",
                effect: "gain 2 energy, damage multiplier x3",
                cost: EnergyCost::Drain,
            },
            PassiveObject::BasicShield => Self {
                label: "BasicShield",
                effect: "reflects some basic attacks",
                cost: EnergyCost::Drain,
            },
            PassiveObject::BasicDefense => Self {
                label: "BasicDefense",
                effect: "defends some basic attacks",
                cost: EnergyCost::Free,
            },
            PassiveObject::ObjectDefense => Self {
                label: "ObjectDefense",
                effect: "defends one chosen attack type",
                cost: EnergyCost::Free,
            },
            PassiveObject::ActionDefense => Self {
                label: "ActionDefense",
                effect: "defends a combination of attacks",
                cost: EnergyCost::Free,
            },
        }
    }

    /// Fixed energy cost, zero for free and draining options
    pub fn fixed_cost(&self) -> u32 {
        match self.cost {
            EnergyCost::Fixed(cost) => cost,
            EnergyCost::Free | EnergyCost::Drain => 0,
        }
    }
}

/// Every selectable option, passives first
pub fn catalog() -> Vec<ActionOption> {
    PassiveObject::PLAIN
        .into_iter()
        .chain(PassiveObject::SPECIAL)
        .map(ActionOption::Passive)
        .chain(ActiveActionName::ALL.into_iter().map(ActionOption::Active))
        .collect()
}

/// Total cost of an active multiset
pub fn active_cost(actions: &[ActiveActionName]) -> u32 {
    actions
        .iter()
        .map(|name| ActionRule::for_active(*name).fixed_cost())
        .sum()
}

/// Whether a whole option group is locked by the current selection
pub fn group_locked(group: OptionGroup, pending: Option<&PendingAction>, submitted: bool) -> bool {
    if submitted {
        return true;
    }

    match (group, pending) {
        (_, None) => false,
        (OptionGroup::PlainPassive, Some(PendingAction::Active(_))) => true,
        (OptionGroup::PlainPassive, Some(PendingAction::Passive(selection))) => {
            !matches!(selection, PassiveSelection::Plain(_))
        }
        (OptionGroup::Active, Some(PendingAction::Passive(PassiveSelection::Plain(_)))) => true,
        (OptionGroup::Active, Some(_)) => false,
        (OptionGroup::SpecialDefense, Some(PendingAction::Active(_))) => true,
        (OptionGroup::SpecialDefense, Some(PendingAction::Passive(selection))) => {
            matches!(selection, PassiveSelection::Plain(_))
        }
    }
}

/// Whether displayed energy cannot cover adding `option` to the selection
///
/// Informational only: a shortfall greys the option out but never blocks a submit.
pub fn energy_shortfall(option: ActionOption, energy: i32, pending: Option<&PendingAction>) -> bool {
    let ActionOption::Active(name) = option else {
        return false;
    };

    // Picks for a defense are not played, so they cost nothing.
    let committed = match pending {
        Some(PendingAction::Active(actions)) => active_cost(actions),
        Some(PendingAction::Passive(PassiveSelection::Plain(_))) | None => 0,
        Some(PendingAction::Passive(_)) => return false,
    };

    let needed = committed + ActionRule::for_active(name).fixed_cost();
    i64::from(needed) > i64::from(energy.max(0))
}

/// Combined lock used to grey out a single option
pub fn option_disabled(
    option: ActionOption,
    energy: i32,
    pending: Option<&PendingAction>,
    submitted: bool,
) -> bool {
    group_locked(option.group(), pending, submitted) || energy_shortfall(option, energy, pending)
}
