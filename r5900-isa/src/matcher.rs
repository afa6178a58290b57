use crate::Opcode;

/// An entry in a [Match] table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// No instruction is encoded by this bit pattern.
    Invalid,
    /// The pattern selects a nested table that inspects another field of the same word.
    Match(Box<Match>),
    /// The pattern selects a concrete instruction kind.
    Opcode(Opcode),
}

impl From<Opcode> for Entry {
    fn from(opcode: Opcode) -> Self {
        Self::Opcode(opcode)
    }
}

impl From<Match> for Entry {
    fn from(table: Match) -> Self {
        Self::Match(Box::new(table))
    }
}

impl Entry {
    fn describe(&self) -> String {
        match self {
            Self::Invalid => "invalid".into(),
            Self::Match(table) => format!("table[{}:{}]", table.start, table.len),
            Self::Opcode(opcode) => opcode.mnemonic().into(),
        }
    }
}

/// Records an attempt to assign two entries to the same bit pattern of a table.
///
/// The first entry is kept, the conflicting one is recorded here so that the ambiguity is visible
/// rather than silently resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The lowest bit of the field that was being matched.
    pub start: u8,

    /// The number of bits in the field that was being matched.
    pub len: u8,

    /// The field value that both entries were assigned to.
    pub value: u32,

    /// A description of the entry that was kept.
    pub kept: String,

    /// A description of the entry that was rejected.
    pub rejected: String,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bits[{}:{}] == {:#x}: kept `{}`, rejected `{}`",
            self.start, self.len, self.value, self.kept, self.rejected
        )
    }
}

/// A node of the opcode trie: extracts `len` bits starting at bit `start` of the instruction word
/// and uses the result to select the next entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub start: u8,
    pub len: u8,
    entries: Box<[Entry]>,
    conflicts: Vec<Conflict>,
}

impl Match {
    pub fn new(start: u8, len: u8) -> Self {
        assert!(len > 0 && len <= 8 && start + len <= 32, "invalid field: [{start}:{len}]");
        Self {
            start,
            len,
            entries: vec![Entry::Invalid; 1 << len].into_boxed_slice(),
            conflicts: vec![],
        }
    }

    /// Assigns `entry` to the field value `value`.
    pub fn with(mut self, value: u32, entry: impl Into<Entry>) -> Self {
        self.insert(value, entry.into());
        self
    }

    fn insert(&mut self, value: u32, entry: Entry) {
        let Some(slot) = self.entries.get_mut(value as usize)
        else {
            self.conflicts.push(Conflict {
                start: self.start,
                len: self.len,
                value,
                kept: "out of range".into(),
                rejected: entry.describe(),
            });
            return;
        };

        if matches!(slot, Entry::Invalid) {
            *slot = entry;
            return;
        }

        let conflict = Conflict {
            start: self.start,
            len: self.len,
            value,
            kept: slot.describe(),
            rejected: entry.describe(),
        };
        tracing::warn!("opcode table conflict: {conflict}");
        self.conflicts.push(conflict);
    }

    /// Extracts the bits of `word` inspected by this node.
    #[inline]
    pub fn extract(&self, word: u32) -> u32 {
        (word >> self.start) & ((1 << self.len) - 1)
    }

    /// Walks the trie for `word`, returning the matched instruction kind.
    pub fn lookup(&self, word: u32) -> Option<Opcode> {
        match &self.entries[self.extract(word) as usize] {
            Entry::Invalid => None,
            Entry::Match(inner) => inner.lookup(word),
            Entry::Opcode(opcode) => Some(*opcode),
        }
    }

    /// The number of nested tables visited when decoding `word`, including this one.
    pub fn depth(&self, word: u32) -> usize {
        match &self.entries[self.extract(word) as usize] {
            Entry::Match(inner) => 1 + inner.depth(word),
            _ => 1,
        }
    }

    /// Every conflict recorded while building this table or any of its nested tables.
    pub fn conflicts(&self) -> Vec<&Conflict> {
        let mut out: Vec<&Conflict> = self.conflicts.iter().collect();
        for entry in self.entries.iter() {
            if let Entry::Match(inner) = entry {
                out.extend(inner.conflicts());
            }
        }
        out
    }

    /// Visits every instruction kind reachable from this table.
    pub fn for_each_opcode(&self, f: &mut impl FnMut(Opcode)) {
        for entry in self.entries.iter() {
            match entry {
                Entry::Invalid => {}
                Entry::Match(inner) => inner.for_each_opcode(f),
                Entry::Opcode(opcode) => f(*opcode),
            }
        }
    }
}
