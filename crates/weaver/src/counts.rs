/// Counters aggregated over one seeding or frontier pass, and summed
/// over a whole run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PassCounts {
    /// Parents whose info was fetched fresh during the pass.
    pub new_parents: usize,
    /// Children whose info was fetched fresh during the pass.
    pub new_children: usize,
    /// Edges committed to the destination for the first time.
    pub new_edges: usize,
    /// Parents whose info or child-list fetch transiently failed.
    pub failed_parents: usize,
    /// Children whose info fetch transiently failed, plus children
    /// discarded for carrying no identifiers.
    pub failed_children: usize,
}

impl PassCounts {
    /// Entities that acquired info for the first time this pass.
    pub fn new_entities(&self) -> usize {
        self.new_parents + self.new_children
    }

    /// A quiescent pass discovered nothing new: the driver's
    /// termination condition. Failure counters are informational and
    /// do not keep a run alive.
    pub fn is_quiescent(&self) -> bool {
        self.new_entities() == 0
    }
}

impl std::ops::AddAssign for PassCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.new_parents += rhs.new_parents;
        self.new_children += rhs.new_children;
        self.new_edges += rhs.new_edges;
        self.failed_parents += rhs.failed_parents;
        self.failed_children += rhs.failed_children;
    }
}
