/// Conversion goals a source may report, with the integer code stored for each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Goal {
    Registration,
    Deposit,
    DepositWithoutRegistration,
}

impl Goal {
    pub const ALL: [Goal; 3] = [
        Goal::Registration,
        Goal::Deposit,
        Goal::DepositWithoutRegistration,
    ];

    pub const fn value(self) -> &'static str {
        match self {
            Goal::Registration => "reg",
            Goal::Deposit => "dep",
            Goal::DepositWithoutRegistration => "dep_without_reg",
        }
    }

    pub const fn code(self) -> i32 {
        match self {
            Goal::Registration => 0,
            Goal::Deposit => 1,
            Goal::DepositWithoutRegistration => 2,
        }
    }

    /// Exact, case-sensitive match against the vocabulary.
    pub fn from_value(value: &str) -> Option<Goal> {
        Goal::ALL.into_iter().find(|goal| goal.value() == value)
    }
}
