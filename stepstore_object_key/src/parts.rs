/// The fields that name one object: the data of one variable, written by one rank, in one timestep.
///
/// Fields are encoded in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ObjectKeyParts {
    /// The job identifier shared by every rank of a run.
    pub job_id: String,
    /// The experiment name shared by every rank of a run.
    pub experiment_name: String,
    /// The timestep (the engine's step counter).
    pub timestep: u64,
    /// The variable name.
    pub variable_name: String,
    /// The variable version, bumped when a variable is redeclared under the same name.
    pub variable_version: u64,
    /// The global offset of the local block on each axis.
    pub offsets: Vec<u64>,
    /// The rank that wrote the object.
    pub rank: u64,
}

impl ObjectKeyParts {
    /// Create key parts for `variable_name` in `job_id`/`experiment_name`.
    ///
    /// The numeric fields are zero and the offsets are empty.
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        experiment_name: impl Into<String>,
        variable_name: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            experiment_name: experiment_name.into(),
            variable_name: variable_name.into(),
            ..Self::default()
        }
    }

    /// Set the timestep.
    #[must_use]
    pub fn with_timestep(mut self, timestep: u64) -> Self {
        self.timestep = timestep;
        self
    }

    /// Set the variable version.
    #[must_use]
    pub fn with_variable_version(mut self, variable_version: u64) -> Self {
        self.variable_version = variable_version;
        self
    }

    /// Set the per-axis offsets.
    #[must_use]
    pub fn with_offsets(mut self, offsets: impl Into<Vec<u64>>) -> Self {
        self.offsets = offsets.into();
        self
    }

    /// Set the rank.
    #[must_use]
    pub fn with_rank(mut self, rank: u64) -> Self {
        self.rank = rank;
        self
    }

    /// Returns the names of the fields that differ between `self` and `other`.
    #[must_use]
    pub fn differing_fields(&self, other: &Self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.job_id != other.job_id {
            fields.push("job_id");
        }
        if self.experiment_name != other.experiment_name {
            fields.push("experiment_name");
        }
        if self.timestep != other.timestep {
            fields.push("timestep");
        }
        if self.variable_name != other.variable_name {
            fields.push("variable_name");
        }
        if self.variable_version != other.variable_version {
            fields.push("variable_version");
        }
        if self.offsets != other.offsets {
            fields.push("offsets");
        }
        if self.rank != other.rank {
            fields.push("rank");
        }
        fields
    }
}
