use {
    candle_core::{
        Device,
        Tensor,
    },
    polars::prelude::{
        DataFrame,
        NamedFrom,
        ParquetReader,
        ParquetWriter,
        PolarsError,
        SerReader,
        Series,
    },
    rand::{
        distributions::{
            Distribution,
            WeightedError,
            WeightedIndex,
        },
        Rng,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        fs::File,
        path::Path,
    },
    thiserror::Error,
    tracing::{
        debug,
        info,
        trace,
    },
};


/// Errors raised by the [`PrioritizedReplayBuffer`].
#[derive(Error, Debug)]
pub enum ReplayBufferError {
    /// The buffer was constructed with unusable dimensions.
    #[error("invalid replay buffer configuration: {0}")]
    InvalidConfig(String),

    /// A stored or imported array does not have the configured width.
    #[error("shape mismatch for {field}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A discrete action was given to a continuous buffer or vice versa.
    #[error("this replay buffer expects {expected} actions")]
    ActionKind { expected: &'static str },

    /// A discrete action index is outside of the action space.
    #[error("discrete action {action} is out of range for {n_actions} actions")]
    ActionOutOfRange { action: usize, n_actions: usize },

    #[error("cannot sample from an empty replay buffer")]
    InsufficientData,

    /// A priority update referenced a slot that holds no transition.
    #[error("index {index} is out of range for a buffer holding {len} transitions")]
    OutOfRange { index: usize, len: usize },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The priority distribution could not be built. The priority floor and
    /// the initial priority of 1.0 keep this from happening in normal use.
    #[error("degenerate priority distribution: {0}")]
    Sampling(#[from] WeightedError),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, ReplayBufferError>;


/// The action part of a transition.
///
/// Discrete actions are one-hot encoded when they are stored, continuous
/// actions are stored as they are.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action<'a> {
    Discrete(usize),
    Continuous(&'a [f64]),
}

/// Dimensions of the transitions a [`PrioritizedReplayBuffer`] holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayBufferConfig {
    /// Number of slots in the ring.
    pub capacity: usize,
    pub state_dims: usize,
    /// Width of the auxiliary feature vectors stored next to each state (may be zero).
    pub aux_dims: usize,
    pub n_actions: usize,
    /// Whether actions are indices that should be stored one-hot.
    pub discrete: bool,
}

/// A minibatch of transitions, gathered into flat row-major arrays.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub batch_size: usize,
    pub state_dims: usize,
    pub aux_dims: usize,
    pub n_actions: usize,
    pub states: Vec<f64>,
    pub aux: Vec<f64>,
    pub actions: Vec<f64>,
    pub rewards: Vec<f64>,
    pub next_states: Vec<f64>,
    pub next_aux: Vec<f64>,
    /// `1 - done` for every transition.
    pub terminals: Vec<f64>,
}

/// A [`Batch`] moved onto a device.
///
/// States and actions have shape `(batch, dims)`, rewards and terminal flags
/// have shape `(batch, 1)`. The auxiliary features are `None` if the buffer
/// does not store any.
pub struct TensorBatch {
    pub states: Tensor,
    pub aux: Option<Tensor>,
    pub actions: Tensor,
    pub rewards: Tensor,
    pub next_states: Tensor,
    pub next_aux: Option<Tensor>,
    pub terminals: Tensor,
}

impl Batch {
    pub fn to_tensors(
        &self,
        device: &Device,
    ) -> candle_core::Result<TensorBatch> {
        let b = self.batch_size;
        let aux = |values: &[f64]| {
            if self.aux_dims == 0 {
                Ok(None)
            } else {
                Tensor::from_slice(values, (b, self.aux_dims), device).map(Some)
            }
        };
        Ok(TensorBatch {
            states: Tensor::from_slice(&self.states, (b, self.state_dims), device)?,
            aux: aux(&self.aux)?,
            actions: Tensor::from_slice(&self.actions, (b, self.n_actions), device)?,
            rewards: Tensor::from_slice(&self.rewards, (b, 1), device)?,
            next_states: Tensor::from_slice(&self.next_states, (b, self.state_dims), device)?,
            next_aux: aux(&self.next_aux)?,
            terminals: Tensor::from_slice(&self.terminals, (b, 1), device)?,
        })
    }
}

/// The slots a [`Sample`] was drawn from.
///
/// This is the handle that has to be passed back into
/// [`PrioritizedReplayBuffer::update_priorities`] once the TD errors of the
/// batch are known. It can only be obtained from a call to `sample`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampledIndices(Vec<usize>);

impl SampledIndices {
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The result of a prioritized sampling call.
pub struct Sample {
    pub batch: Batch,
    /// Importance weights, normalized so that the largest one is 1.0.
    pub weights: Vec<f64>,
    pub indices: SampledIndices,
}

/// A single stored transition, copied out of the buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredTransition {
    pub state: Vec<f64>,
    pub aux: Vec<f64>,
    pub action: Vec<f64>,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub next_aux: Vec<f64>,
    pub terminal: f64,
    pub priority: f64,
}

/// The valid prefix of every array in the buffer.
///
/// Multi-dimensional components are flat and row-major, all of them hold
/// `len()` rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayBufferData {
    pub state_dims: usize,
    pub aux_dims: usize,
    pub n_actions: usize,
    pub states: Vec<f64>,
    pub aux: Vec<f64>,
    pub next_states: Vec<f64>,
    pub next_aux: Vec<f64>,
    pub actions: Vec<f64>,
    pub rewards: Vec<f64>,
    pub terminals: Vec<f64>,
    pub priorities: Vec<f64>,
}

impl ReplayBufferData {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}


/// A fixed-capacity replay buffer with proportional prioritization.
///
/// Transitions live in parallel, preallocated arrays (one per component). A
/// single write counter that only ever grows decides the next slot
/// (`written % capacity`), so once the buffer is full the oldest transition is
/// overwritten first. Only the first `min(written, capacity)` slots are valid.
///
/// # Sampling
///
/// Slot `i` is drawn with probability `p_i^α / Σ_j p_j^α`, where `α` is the
/// priority scale passed to [`sample`](Self::sample). Each drawn transition
/// gets the importance weight `1 / (N · P(i))`, divided by the largest weight
/// of the batch.
pub struct PrioritizedReplayBuffer {
    states: Vec<f64>,
    aux: Vec<f64>,
    next_states: Vec<f64>,
    next_aux: Vec<f64>,
    actions: Vec<f64>,
    rewards: Vec<f64>,
    terminals: Vec<f64>,
    priorities: Vec<f64>,

    config: ReplayBufferConfig,
    written: usize,
    // Priority given to new entries, `max(max_priority, 1.0)`.
    entry_priority: f64,
}

impl PrioritizedReplayBuffer {
    /// Create a new, empty replay buffer. All arrays are allocated up front.
    pub fn new(config: ReplayBufferConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(ReplayBufferError::InvalidConfig("capacity must be positive".to_owned()));
        }
        if config.state_dims == 0 {
            return Err(ReplayBufferError::InvalidConfig("state_dims must be positive".to_owned()));
        }
        if config.n_actions == 0 {
            return Err(ReplayBufferError::InvalidConfig("n_actions must be positive".to_owned()));
        }
        let ReplayBufferConfig { capacity, state_dims, aux_dims, n_actions, .. } = config;
        Ok(Self {
            states: vec![0.0; capacity * state_dims],
            aux: vec![0.0; capacity * aux_dims],
            next_states: vec![0.0; capacity * state_dims],
            next_aux: vec![0.0; capacity * aux_dims],
            actions: vec![0.0; capacity * n_actions],
            rewards: vec![0.0; capacity],
            terminals: vec![0.0; capacity],
            priorities: vec![0.0; capacity],
            config,
            written: 0,
            entry_priority: 1.0,
        })
    }

    pub fn config(&self) -> &ReplayBufferConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of valid transitions.
    pub fn len(&self) -> usize {
        self.written.min(self.config.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn is_full(&self) -> bool {
        self.written >= self.config.capacity
    }

    /// Number of transitions ever stored, including overwritten ones.
    pub fn total_written(&self) -> usize {
        self.written
    }

    /// Priorities of the valid slots.
    pub fn priorities(&self) -> &[f64] {
        &self.priorities[..self.len()]
    }

    /// The largest priority among the valid slots, 0.0 for an empty buffer.
    pub fn max_priority(&self) -> f64 {
        self.priorities().iter().copied().fold(0.0, f64::max)
    }

    /// Store a transition without auxiliary features.
    pub fn store_transition(
        &mut self,
        state: &[f64],
        action: Action<'_>,
        reward: f64,
        next_state: &[f64],
        done: bool,
    ) -> Result<()> {
        self.store_transition_with_aux(state, &[], action, reward, next_state, &[], done)
    }

    /// Store a transition in the next slot of the ring.
    ///
    /// The new transition gets the priority `max(max_priority, 1.0)` so that it
    /// is sampled at least as often as the best known transition. Nothing is
    /// written if any of the inputs has the wrong shape.
    #[allow(clippy::too_many_arguments)]
    pub fn store_transition_with_aux(
        &mut self,
        state: &[f64],
        aux: &[f64],
        action: Action<'_>,
        reward: f64,
        next_state: &[f64],
        next_aux: &[f64],
        done: bool,
    ) -> Result<()> {
        let ReplayBufferConfig { state_dims, aux_dims, n_actions, discrete, .. } = self.config;
        check_width("state", state_dims, state.len())?;
        check_width("next_state", state_dims, next_state.len())?;
        check_width("aux", aux_dims, aux.len())?;
        check_width("next_aux", aux_dims, next_aux.len())?;
        match (action, discrete) {
            (Action::Discrete(a), true) if a >= n_actions => {
                return Err(ReplayBufferError::ActionOutOfRange { action: a, n_actions });
            }
            (Action::Continuous(values), false) => check_width("action", n_actions, values.len())?,
            (Action::Discrete(_), false) => {
                return Err(ReplayBufferError::ActionKind { expected: "continuous" });
            }
            (Action::Continuous(_), true) => {
                return Err(ReplayBufferError::ActionKind { expected: "discrete" });
            }
            _ => {}
        }

        let priority = self.entry_priority;
        let index = self.written % self.config.capacity;

        row_mut(&mut self.states, state_dims, index).copy_from_slice(state);
        row_mut(&mut self.next_states, state_dims, index).copy_from_slice(next_state);
        row_mut(&mut self.aux, aux_dims, index).copy_from_slice(aux);
        row_mut(&mut self.next_aux, aux_dims, index).copy_from_slice(next_aux);

        let action_row = row_mut(&mut self.actions, n_actions, index);
        match action {
            Action::Discrete(a) => {
                action_row.fill(0.0);
                action_row[a] = 1.0;
            }
            Action::Continuous(values) => action_row.copy_from_slice(values),
        }

        self.rewards[index] = reward;
        self.terminals[index] = if done { 0.0 } else { 1.0 };
        self.priorities[index] = priority;
        self.written += 1;

        trace!(index, reward, done, priority, "stored transition");
        Ok(())
    }

    /// Sampling probabilities of the valid slots for the given priority scale.
    pub fn probabilities(
        &self,
        priority_scale: f64,
    ) -> Result<Vec<f64>> {
        if !(priority_scale.is_finite() && priority_scale >= 0.0) {
            return Err(ReplayBufferError::InvalidParameter {
                name: "priority_scale",
                reason: format!("must be finite and non-negative, got {priority_scale}"),
            });
        }
        let scaled: Vec<f64> = self
            .priorities()
            .iter()
            .map(|p| p.powf(priority_scale))
            .collect();
        let total: f64 = scaled.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(ReplayBufferError::Sampling(WeightedError::AllWeightsZero));
        }
        Ok(scaled.into_iter().map(|p| p / total).collect())
    }

    /// Draw `batch_size` transitions with replacement according to their
    /// priorities.
    ///
    /// A full batch is returned even when the buffer holds fewer transitions
    /// than requested, in which case duplicates are certain.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        priority_scale: f64,
        rng: &mut R,
    ) -> Result<Sample> {
        if self.is_empty() {
            return Err(ReplayBufferError::InsufficientData);
        }
        if batch_size == 0 {
            return Err(ReplayBufferError::InvalidParameter {
                name: "batch_size",
                reason: "must be positive".to_owned(),
            });
        }

        let probabilities = self.probabilities(priority_scale)?;
        let distribution = WeightedIndex::new(&probabilities)?;
        let indices: Vec<usize> = (0..batch_size)
            .map(|_| distribution.sample(rng))
            .collect();

        let n = self.len() as f64;
        let raw: Vec<f64> = indices
            .iter()
            .map(|&i| 1.0 / (n * probabilities[i]))
            .collect();
        let max_weight = raw.iter().copied().fold(f64::MIN_POSITIVE, f64::max);
        let weights = raw.into_iter().map(|w| w / max_weight).collect();

        debug!(batch_size, priority_scale, valid = self.len(), "sampled minibatch");

        Ok(Sample {
            batch: self.gather(&indices),
            weights,
            indices: SampledIndices(indices),
        })
    }

    fn gather(
        &self,
        indices: &[usize],
    ) -> Batch {
        let ReplayBufferConfig { state_dims, aux_dims, n_actions, .. } = self.config;
        let rows = |data: &[f64], width: usize| -> Vec<f64> {
            indices
                .iter()
                .flat_map(|&i| row(data, width, i).iter().copied())
                .collect()
        };
        Batch {
            batch_size: indices.len(),
            state_dims,
            aux_dims,
            n_actions,
            states: rows(&self.states, state_dims),
            aux: rows(&self.aux, aux_dims),
            actions: rows(&self.actions, n_actions),
            rewards: rows(&self.rewards, 1),
            next_states: rows(&self.next_states, state_dims),
            next_aux: rows(&self.next_aux, aux_dims),
            terminals: rows(&self.terminals, 1),
        }
    }

    /// Refresh the priorities of sampled slots from their TD errors.
    ///
    /// The new priority is `min(|td_error| + offset, 1.0)`, so it always lies
    /// in `[offset, 1.0]` and no transition can stop being sampled.
    pub fn update_priorities(
        &mut self,
        indices: &SampledIndices,
        td_errors: &[f64],
        offset: f64,
    ) -> Result<()> {
        if !(offset > 0.0 && offset <= 1.0) {
            return Err(ReplayBufferError::InvalidParameter {
                name: "offset",
                reason: format!("must lie in (0, 1], got {offset}"),
            });
        }
        check_width("td_errors", indices.len(), td_errors.len())?;
        let len = self.len();
        if let Some(&index) = indices.as_slice().iter().find(|&&i| i >= len) {
            return Err(ReplayBufferError::OutOfRange { index, len });
        }

        // Refreshed priorities never exceed 1.0, so the entry priority can only
        // drop if it came from imported priorities above 1.0.
        let mut lowered_max = false;
        for (&i, e) in indices.as_slice().iter().zip(td_errors) {
            lowered_max |= self.priorities[i] == self.entry_priority && self.entry_priority > 1.0;
            self.priorities[i] = (e.abs() + offset).min(1.0);
        }
        if lowered_max {
            self.entry_priority = self.max_priority().max(1.0);
        }
        Ok(())
    }

    /// Copy out the transition in slot `index`, if that slot is valid.
    pub fn transition(
        &self,
        index: usize,
    ) -> Option<StoredTransition> {
        if index >= self.len() {
            return None;
        }
        let ReplayBufferConfig { state_dims, aux_dims, n_actions, .. } = self.config;
        Some(StoredTransition {
            state: row(&self.states, state_dims, index).to_vec(),
            aux: row(&self.aux, aux_dims, index).to_vec(),
            action: row(&self.actions, n_actions, index).to_vec(),
            reward: self.rewards[index],
            next_state: row(&self.next_states, state_dims, index).to_vec(),
            next_aux: row(&self.next_aux, aux_dims, index).to_vec(),
            terminal: self.terminals[index],
            priority: self.priorities[index],
        })
    }

    /// Copy the valid prefix of every array.
    pub fn export(&self) -> ReplayBufferData {
        let ReplayBufferConfig { state_dims, aux_dims, n_actions, .. } = self.config;
        let n = self.len();
        ReplayBufferData {
            state_dims,
            aux_dims,
            n_actions,
            states: self.states[..n * state_dims].to_vec(),
            aux: self.aux[..n * aux_dims].to_vec(),
            next_states: self.next_states[..n * state_dims].to_vec(),
            next_aux: self.next_aux[..n * aux_dims].to_vec(),
            actions: self.actions[..n * n_actions].to_vec(),
            rewards: self.rewards[..n].to_vec(),
            terminals: self.terminals[..n].to_vec(),
            priorities: self.priorities[..n].to_vec(),
        }
    }

    /// Replace the contents of the buffer with previously exported data.
    ///
    /// The rows are restored verbatim into the first slots and the write
    /// counter is set to the number of rows.
    pub fn import(
        &mut self,
        data: &ReplayBufferData,
    ) -> Result<()> {
        let ReplayBufferConfig { capacity, state_dims, aux_dims, n_actions, .. } = self.config;
        let n = data.len();
        if n > capacity {
            return Err(ReplayBufferError::InvalidParameter {
                name: "data",
                reason: format!("{n} rows do not fit into a capacity of {capacity}"),
            });
        }
        check_width("state_dims", state_dims, data.state_dims)?;
        check_width("aux_dims", aux_dims, data.aux_dims)?;
        check_width("n_actions", n_actions, data.n_actions)?;
        check_width("states", n * state_dims, data.states.len())?;
        check_width("next_states", n * state_dims, data.next_states.len())?;
        check_width("aux", n * aux_dims, data.aux.len())?;
        check_width("next_aux", n * aux_dims, data.next_aux.len())?;
        check_width("actions", n * n_actions, data.actions.len())?;
        check_width("terminals", n, data.terminals.len())?;
        check_width("priorities", n, data.priorities.len())?;

        self.states[..n * state_dims].copy_from_slice(&data.states);
        self.next_states[..n * state_dims].copy_from_slice(&data.next_states);
        self.aux[..n * aux_dims].copy_from_slice(&data.aux);
        self.next_aux[..n * aux_dims].copy_from_slice(&data.next_aux);
        self.actions[..n * n_actions].copy_from_slice(&data.actions);
        self.rewards[..n].copy_from_slice(&data.rewards);
        self.terminals[..n].copy_from_slice(&data.terminals);
        self.priorities[..n].copy_from_slice(&data.priorities);
        self.written = n;
        self.entry_priority = self.max_priority().max(1.0);
        Ok(())
    }

    /// Write the valid prefix of the buffer to a parquet file, one column per
    /// scalar component (`state_0`, `state_1`, ..., `reward`, `priority`).
    pub fn save<P: AsRef<Path> + ?Sized>(
        &self,
        path: &P,
    ) -> Result<()> {
        let data = self.export();
        let mut columns = Vec::new();
        for (name, width, values) in data.components() {
            for d in 0..width {
                let column: Vec<f64> = values.iter().skip(d).step_by(width).copied().collect();
                columns.push(Series::new(&format!("{name}_{d}"), column));
            }
        }
        columns.push(Series::new("reward", &data.rewards));
        columns.push(Series::new("terminal", &data.terminals));
        columns.push(Series::new("priority", &data.priorities));

        let mut df = DataFrame::new(columns)?;
        ParquetWriter::new(File::create(path)?).finish(&mut df)?;
        info!(rows = data.len(), "saved replay buffer");
        Ok(())
    }

    /// Restore the buffer from a parquet file written by [`save`](Self::save).
    pub fn load<P: AsRef<Path> + ?Sized>(
        &mut self,
        path: &P,
    ) -> Result<()> {
        let df = ParquetReader::new(File::open(path)?).finish()?;
        let ReplayBufferConfig { state_dims, aux_dims, n_actions, .. } = self.config;

        let column = |name: &str| -> Result<Vec<f64>> {
            Ok(df.column(name)?.f64()?.into_no_null_iter().collect())
        };
        let interleaved = |name: &str, width: usize| -> Result<Vec<f64>> {
            let columns = (0..width)
                .map(|d| column(&format!("{name}_{d}")))
                .collect::<Result<Vec<_>>>()?;
            Ok((0..df.height())
                .flat_map(|r| columns.iter().map(move |c| c[r]))
                .collect())
        };

        let data = ReplayBufferData {
            state_dims,
            aux_dims,
            n_actions,
            states: interleaved("state", state_dims)?,
            aux: interleaved("aux", aux_dims)?,
            next_states: interleaved("next_state", state_dims)?,
            next_aux: interleaved("next_aux", aux_dims)?,
            actions: interleaved("action", n_actions)?,
            rewards: column("reward")?,
            terminals: column("terminal")?,
            priorities: column("priority")?,
        };
        self.import(&data)?;
        info!(rows = data.len(), "loaded replay buffer");
        Ok(())
    }
}

impl ReplayBufferData {
    fn components(&self) -> [(&'static str, usize, &[f64]); 5] {
        [
            ("state", self.state_dims, self.states.as_slice()),
            ("aux", self.aux_dims, self.aux.as_slice()),
            ("next_state", self.state_dims, self.next_states.as_slice()),
            ("next_aux", self.aux_dims, self.next_aux.as_slice()),
            ("action", self.n_actions, self.actions.as_slice()),
        ]
    }
}

fn check_width(
    field: &'static str,
    expected: usize,
    actual: usize,
) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ReplayBufferError::ShapeMismatch { field, expected, actual })
    }
}

fn row(
    data: &[f64],
    width: usize,
    index: usize,
) -> &[f64] {
    &data[index * width..(index + 1) * width]
}

fn row_mut(
    data: &mut [f64],
    width: usize,
    index: usize,
) -> &mut [f64] {
    &mut data[index * width..(index + 1) * width]
}


#[cfg(test)]
mod tests {
    use {
        super::*,
        rand::{
            rngs::StdRng,
            SeedableRng,
        },
    };

    fn continuous(capacity: usize) -> PrioritizedReplayBuffer {
        PrioritizedReplayBuffer::new(ReplayBufferConfig {
            capacity,
            state_dims: 2,
            aux_dims: 0,
            n_actions: 1,
            discrete: false,
        })
        .unwrap()
    }

    fn push(buffer: &mut PrioritizedReplayBuffer, reward: f64) {
        buffer
            .store_transition(
                &[reward, -reward],
                Action::Continuous(&[0.5]),
                reward,
                &[reward + 1.0, 0.0],
                false,
            )
            .unwrap();
    }

    fn rewards(buffer: &PrioritizedReplayBuffer) -> Vec<f64> {
        (0..buffer.len())
            .map(|i| buffer.transition(i).unwrap().reward)
            .collect()
    }

    #[test]
    fn test_ring_wraps_onto_oldest_slot() {
        let mut buffer = continuous(5);
        for r in 1..=7 {
            push(&mut buffer, r as f64);
        }
        assert_eq!(rewards(&buffer), vec![6.0, 7.0, 3.0, 4.0, 5.0]);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.total_written(), 7);
        assert!(buffer.is_full());
    }

    #[test]
    fn test_only_latest_capacity_transitions_survive() {
        let capacity = 8;
        let mut buffer = continuous(capacity);
        for r in 0..(capacity + 13) {
            push(&mut buffer, r as f64);
        }
        let mut stored = rewards(&buffer);
        stored.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let expected: Vec<f64> = (13..capacity + 13).map(|r| r as f64).collect();
        assert_eq!(stored, expected);
    }

    #[test]
    fn test_discrete_actions_are_one_hot_and_done_is_inverted() {
        let mut buffer = PrioritizedReplayBuffer::new(ReplayBufferConfig {
            capacity: 4,
            state_dims: 1,
            aux_dims: 0,
            n_actions: 3,
            discrete: true,
        })
        .unwrap();
        buffer.store_transition(&[0.0], Action::Discrete(2), 1.0, &[1.0], true).unwrap();
        buffer.store_transition(&[1.0], Action::Discrete(0), 1.0, &[2.0], false).unwrap();

        let first = buffer.transition(0).unwrap();
        assert_eq!(first.action, vec![0.0, 0.0, 1.0]);
        assert_eq!(first.terminal, 0.0);
        let second = buffer.transition(1).unwrap();
        assert_eq!(second.action, vec![1.0, 0.0, 0.0]);
        assert_eq!(second.terminal, 1.0);
    }

    #[test]
    fn test_malformed_transitions_are_rejected() {
        let mut buffer = continuous(4);
        assert!(matches!(
            buffer.store_transition(&[0.0], Action::Continuous(&[0.0]), 0.0, &[0.0, 0.0], false),
            Err(ReplayBufferError::ShapeMismatch { field: "state", expected: 2, actual: 1 }),
        ));
        assert!(matches!(
            buffer.store_transition(&[0.0, 0.0], Action::Continuous(&[0.0, 1.0]), 0.0, &[0.0, 0.0], false),
            Err(ReplayBufferError::ShapeMismatch { field: "action", .. }),
        ));
        assert!(matches!(
            buffer.store_transition(&[0.0, 0.0], Action::Discrete(0), 0.0, &[0.0, 0.0], false),
            Err(ReplayBufferError::ActionKind { .. }),
        ));
        assert!(buffer.is_empty());

        let mut discrete = PrioritizedReplayBuffer::new(ReplayBufferConfig {
            capacity: 4,
            state_dims: 1,
            aux_dims: 0,
            n_actions: 2,
            discrete: true,
        })
        .unwrap();
        assert!(matches!(
            discrete.store_transition(&[0.0], Action::Discrete(2), 0.0, &[0.0], false),
            Err(ReplayBufferError::ActionOutOfRange { action: 2, n_actions: 2 }),
        ));
    }

    #[test]
    fn test_zero_capacity_is_a_config_error() {
        let result = PrioritizedReplayBuffer::new(ReplayBufferConfig {
            capacity: 0,
            state_dims: 1,
            aux_dims: 0,
            n_actions: 1,
            discrete: false,
        });
        assert!(matches!(result, Err(ReplayBufferError::InvalidConfig(_))));
    }

    #[test]
    fn test_sampling_empty_buffer_fails() {
        let buffer = continuous(4);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            buffer.sample(8, 0.7, &mut rng),
            Err(ReplayBufferError::InsufficientData),
        ));
    }

    #[test]
    fn test_new_transitions_get_at_least_max_priority() {
        let mut buffer = continuous(4);
        push(&mut buffer, 1.0);
        assert_eq!(buffer.priorities(), &[1.0]);

        buffer
            .update_priorities(&SampledIndices(vec![0]), &[0.0], 0.1)
            .unwrap();
        push(&mut buffer, 2.0);
        assert_eq!(buffer.priorities(), &[0.1, 1.0]);
    }

    #[test]
    fn test_imported_priorities_above_one_carry_over_until_refreshed() {
        let mut source = continuous(6);
        push(&mut source, 1.0);
        push(&mut source, 2.0);
        let mut data = source.export();
        data.priorities = vec![0.5, 3.0];

        let mut buffer = continuous(6);
        buffer.import(&data).unwrap();
        push(&mut buffer, 3.0);
        assert_eq!(buffer.priorities(), &[0.5, 3.0, 3.0]);

        buffer
            .update_priorities(&SampledIndices(vec![1]), &[0.2], 0.1)
            .unwrap();
        push(&mut buffer, 4.0);
        assert_eq!(buffer.priorities()[3], 3.0);

        buffer
            .update_priorities(&SampledIndices(vec![2, 3]), &[0.0, 0.0], 0.1)
            .unwrap();
        push(&mut buffer, 5.0);
        assert_eq!(buffer.priorities()[4], 1.0);
    }

    #[test]
    fn test_small_buffer_still_fills_batch() {
        let mut buffer = continuous(10);
        push(&mut buffer, 1.0);
        push(&mut buffer, 2.0);
        let mut rng = StdRng::seed_from_u64(1);
        let sample = buffer.sample(16, 0.7, &mut rng).unwrap();
        assert_eq!(sample.indices.len(), 16);
        assert_eq!(sample.batch.rewards.len(), 16);
        assert_eq!(sample.batch.states.len(), 32);
        assert!(sample.indices.as_slice().iter().all(|&i| i < 2));
    }

    #[test]
    fn test_importance_weights_are_normalized() {
        let mut buffer = continuous(32);
        for r in 0..32 {
            push(&mut buffer, r as f64);
        }
        let indices = SampledIndices((0..32).collect());
        let errors: Vec<f64> = (0..32).map(|i| i as f64 * 0.03).collect();
        buffer.update_priorities(&indices, &errors, 0.1).unwrap();

        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..20 {
            let sample = buffer.sample(64, 0.7, &mut rng).unwrap();
            assert!(sample.weights.iter().all(|&w| w > 0.0 && w <= 1.0));
            let max = sample.weights.iter().copied().fold(0.0, f64::max);
            assert_eq!(max, 1.0);
        }
    }

    #[test]
    fn test_priority_updates_stay_within_offset_and_one() {
        let mut buffer = continuous(8);
        for r in 0..6 {
            push(&mut buffer, r as f64);
        }
        let indices = SampledIndices(vec![0, 1, 2, 3, 4, 5]);
        let offset = 0.1;
        buffer
            .update_priorities(&indices, &[0.0, 1e12, -5.0, 0.05, -0.0, f64::NAN], offset)
            .unwrap();
        for &p in buffer.priorities() {
            assert!((offset..=1.0).contains(&p), "priority {p} out of bounds");
        }
        assert_eq!(buffer.priorities()[0], offset);
        assert_eq!(buffer.priorities()[1], 1.0);
        assert!((buffer.priorities()[3] - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_priority_update_rejects_indices_of_other_buffers() {
        let mut large = continuous(16);
        for r in 0..16 {
            push(&mut large, r as f64);
        }
        // Everything but slot 15 gets a negligible priority.
        let all = SampledIndices((0..16).collect());
        let mut errors = vec![0.0; 16];
        errors[15] = 10.0;
        large.update_priorities(&all, &errors, 1e-6).unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        let sample = large.sample(8, 1.0, &mut rng).unwrap();

        let mut small = continuous(4);
        push(&mut small, 0.0);
        let result = small.update_priorities(&sample.indices, &[0.0; 8], 0.1);
        assert!(matches!(result, Err(ReplayBufferError::OutOfRange { len: 1, .. })));
        assert_eq!(small.priorities(), &[1.0]);
    }

    #[test]
    fn test_priority_update_rejects_bad_offset_and_lengths() {
        let mut buffer = continuous(4);
        push(&mut buffer, 0.0);
        let indices = SampledIndices(vec![0]);
        assert!(matches!(
            buffer.update_priorities(&indices, &[0.0], 0.0),
            Err(ReplayBufferError::InvalidParameter { name: "offset", .. }),
        ));
        assert!(matches!(
            buffer.update_priorities(&indices, &[0.0, 1.0], 0.1),
            Err(ReplayBufferError::ShapeMismatch { .. }),
        ));
    }

    #[test]
    fn test_zero_priority_scale_samples_uniformly() {
        let mut buffer = continuous(4);
        for r in 0..4 {
            push(&mut buffer, r as f64);
        }
        buffer
            .update_priorities(&SampledIndices(vec![0, 1, 2, 3]), &[0.9, 0.0, 0.3, 0.6], 0.1)
            .unwrap();

        let mut rng = StdRng::seed_from_u64(4);
        let mut counts = [0usize; 4];
        let rounds = 500;
        for _ in 0..rounds {
            let sample = buffer.sample(100, 0.0, &mut rng).unwrap();
            for &i in sample.indices.as_slice() {
                counts[i] += 1;
            }
            assert!(sample.weights.iter().all(|&w| w == 1.0));
        }
        let total = (rounds * 100) as f64;
        for count in counts {
            let frequency = count as f64 / total;
            assert!((frequency - 0.25).abs() < 0.01, "frequency {frequency}");
        }
    }

    #[test]
    fn test_dominant_priority_is_sampled_more_often() {
        let mut buffer = continuous(4);
        for r in 0..4 {
            push(&mut buffer, r as f64);
        }
        buffer
            .update_priorities(&SampledIndices(vec![0, 1, 2, 3]), &[5.0, 0.0, 0.0, 0.0], 0.05)
            .unwrap();

        let probabilities = buffer.probabilities(1.0).unwrap();
        assert!((probabilities[0] - 1.0 / 1.15).abs() < 1e-12);

        let mut rng = StdRng::seed_from_u64(5);
        let mut counts = [0usize; 4];
        for _ in 0..200 {
            let sample = buffer.sample(50, 1.0, &mut rng).unwrap();
            for &i in sample.indices.as_slice() {
                counts[i] += 1;
            }
        }
        for &other in &counts[1..] {
            assert!(counts[0] > 5 * other, "counts {counts:?}");
        }
    }

    #[test]
    fn test_batch_tensors_have_expected_shapes() {
        let mut buffer = PrioritizedReplayBuffer::new(ReplayBufferConfig {
            capacity: 4,
            state_dims: 3,
            aux_dims: 2,
            n_actions: 2,
            discrete: false,
        })
        .unwrap();
        buffer
            .store_transition_with_aux(
                &[1.0, 2.0, 3.0],
                &[0.1, 0.2],
                Action::Continuous(&[0.5, -0.5]),
                1.0,
                &[2.0, 3.0, 4.0],
                &[0.3, 0.4],
                false,
            )
            .unwrap();
        let mut rng = StdRng::seed_from_u64(6);
        let tensors = buffer
            .sample(5, 0.7, &mut rng)
            .unwrap()
            .batch
            .to_tensors(&Device::Cpu)
            .unwrap();
        assert_eq!(tensors.states.dims(), &[5, 3]);
        assert_eq!(tensors.aux.unwrap().dims(), &[5, 2]);
        assert_eq!(tensors.actions.dims(), &[5, 2]);
        assert_eq!(tensors.rewards.dims(), &[5, 1]);
        assert_eq!(tensors.next_aux.unwrap().dims(), &[5, 2]);
        assert_eq!(tensors.terminals.dims(), &[5, 1]);
    }

    #[test]
    fn test_save_and_load_restore_valid_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.parquet");

        let mut buffer = continuous(6);
        for r in 0..4 {
            push(&mut buffer, r as f64);
        }
        buffer
            .update_priorities(&SampledIndices(vec![1, 3]), &[0.2, 0.4], 0.1)
            .unwrap();
        buffer.save(&path).unwrap();

        let mut restored = continuous(6);
        restored.load(&path).unwrap();
        assert_eq!(restored.export(), buffer.export());
        assert_eq!(restored.total_written(), 4);

        push(&mut restored, 9.0);
        assert_eq!(restored.transition(4).unwrap().reward, 9.0);
    }

    #[test]
    fn test_import_rejects_oversized_data() {
        let mut large = continuous(6);
        for r in 0..6 {
            push(&mut large, r as f64);
        }
        let mut small = continuous(3);
        assert!(matches!(
            small.import(&large.export()),
            Err(ReplayBufferError::InvalidParameter { name: "data", .. }),
        ));
    }
}
