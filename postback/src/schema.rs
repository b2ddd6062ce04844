//! Table layout shared by the resolver, the translator and the writer.
//!
//! Both tables use the same column name for a slot: the `mapping` table stores
//! the name a source uses for the slot, the `postback` table stores the value.

pub const MAPPING_TABLE: &str = "mapping";
pub const POSTBACK_TABLE: &str = "postback";
pub const SOURCE_COLUMN: &str = "source";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    SubjectId,
    Code,
    Goal,
}

#[derive(Clone, Copy, Debug)]
pub struct SlotDescriptor {
    pub slot: Slot,
    pub column: &'static str,
}

/// Slots in storage order. The postback insert is positional over this order
/// followed by the source column.
pub const SLOTS: [SlotDescriptor; 3] = [
    SlotDescriptor {
        slot: Slot::SubjectId,
        column: "user_id",
    },
    SlotDescriptor {
        slot: Slot::Code,
        column: "code",
    },
    SlotDescriptor {
        slot: Slot::Goal,
        column: "aim",
    },
];

impl Slot {
    pub const fn index(self) -> usize {
        match self {
            Slot::SubjectId => 0,
            Slot::Code => 1,
            Slot::Goal => 2,
        }
    }

    pub const fn column(self) -> &'static str {
        SLOTS[self.index()].column
    }
}

/// Field names one source uses for each slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mapping {
    pub source: String,
    fields: [String; 3],
}

impl Mapping {
    pub fn new<S, U, C, G>(source: S, subject_id: U, code: C, goal: G) -> Self
    where
        S: Into<String>,
        U: Into<String>,
        C: Into<String>,
        G: Into<String>,
    {
        Mapping {
            source: source.into(),
            fields: [subject_id.into(), code.into(), goal.into()],
        }
    }

    /// The incoming parameter name this source uses for `slot`.
    pub fn field(&self, slot: Slot) -> &str {
        &self.fields[slot.index()]
    }

    /// Mapped field names in slot order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        SLOTS.iter().map(|descriptor| self.field(descriptor.slot))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostbackRecord {
    pub subject_id: String,
    pub code: String,
    pub goal: i32,
    pub source: String,
}

/// Every column a `mapping` row can carry.
pub fn mapping_columns() -> impl Iterator<Item = &'static str> {
    std::iter::once(SOURCE_COLUMN).chain(SLOTS.iter().map(|descriptor| descriptor.column))
}
