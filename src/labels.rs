pub const NUM_CLASSES: usize = 4;

/// Diagnostic classes in the order the classifier emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OctClass {
    Normal = 0,
    Cnv = 1,
    Dme = 2,
    Drusen = 3,
}

impl OctClass {
    pub const ALL: [OctClass; NUM_CLASSES] =
        [OctClass::Normal, OctClass::Cnv, OctClass::Dme, OctClass::Drusen];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            OctClass::Normal => "Normal",
            OctClass::Cnv => "CNV",
            OctClass::Dme => "DME",
            OctClass::Drusen => "DRUSEN",
        }
    }

    pub fn labels() -> impl Iterator<Item = &'static str> {
        Self::ALL.into_iter().map(OctClass::label)
    }
}
