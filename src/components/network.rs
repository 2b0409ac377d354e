use {
    anyhow::{
        anyhow,
        bail,
        Result,
    },
    candle_core::{
        DType,
        Device,
        Module,
        Tensor,
        Var,
    },
    candle_nn::{
        func,
        linear,
        sequential::seq,
        Activation,
        Sequential,
        VarBuilder,
        VarMap,
    },
    std::{
        collections::HashMap,
        path::Path,
        sync::MutexGuard,
    },
};


/// A copy of every parameter of an approximator, keyed by parameter name.
pub type Snapshot = HashMap<String, Tensor>;

/// The parameter side of a function approximator.
///
/// Every approximator keeps its parameters in its own [`VarMap`], and two
/// approximators of the same architecture use the same parameter names. That
/// is what lets a target network [`track`](Approximator::track) its live
/// counterpart by name.
pub trait Approximator {
    fn varmap(&self) -> &VarMap;
    fn varmap_mut(&mut self) -> &mut VarMap;

    /// The trainable parameters, for building an optimizer.
    fn vars(&self) -> Vec<Var> {
        self.varmap().all_vars()
    }

    /// Deep copy of the current parameters.
    fn snapshot(&self) -> Result<Snapshot> {
        lock(self.varmap())?
            .iter()
            .map(|(name, var)| Ok((name.clone(), var.as_tensor().copy()?)))
            .collect()
    }

    /// Overwrite the parameters with a previously taken snapshot.
    fn restore(
        &mut self,
        snapshot: &Snapshot,
    ) -> Result<()> {
        for (name, var) in lock(self.varmap())?.iter() {
            let value = snapshot
                .get(name)
                .ok_or_else(|| anyhow!("snapshot is missing parameter {name}"))?;
            var.set(value)?;
        }
        Ok(())
    }

    /// Move every parameter towards the parameters of `source`:
    /// `self = tau * source + (1 - tau) * self`.
    ///
    /// `tau = 1` copies the source exactly and `tau = 0` changes nothing.
    fn track(
        &mut self,
        source: &Self,
        tau: f64,
    ) -> Result<()>
    where
        Self: Sized,
    {
        if !(0.0..=1.0).contains(&tau) {
            bail!("tau must lie in [0, 1], got {tau}");
        }
        if tau == 0.0 {
            return Ok(());
        }

        let live = lock(source.varmap())?;
        for (name, target) in lock(self.varmap())?.iter() {
            let network = live
                .get(name)
                .ok_or_else(|| anyhow!("source network has no parameter {name}"))?
                .as_tensor();
            if tau == 1.0 {
                target.set(network)?;
            } else {
                target.set(&((tau * network)? + ((1.0 - tau) * target.as_tensor())?)?)?;
            }
        }
        Ok(())
    }

    /// Write the parameters as safetensors.
    fn save<P: AsRef<Path> + ?Sized>(
        &self,
        path: &P,
    ) -> Result<()>
    where
        Self: Sized,
    {
        Ok(self.varmap().save(path.as_ref())?)
    }

    /// Read parameters written by [`save`](Approximator::save).
    fn load<P: AsRef<Path> + ?Sized>(
        &mut self,
        path: &P,
    ) -> Result<()>
    where
        Self: Sized,
    {
        Ok(self.varmap_mut().load(path.as_ref())?)
    }
}

/// A deterministic policy `mu(s)`.
pub trait Actor: Approximator {
    fn forward(
        &self,
        state: &Tensor,
        aux: Option<&Tensor>,
    ) -> candle_core::Result<Tensor>;
}

/// An action-value function `Q(s, a)`.
pub trait Critic: Approximator {
    fn forward(
        &self,
        state: &Tensor,
        aux: Option<&Tensor>,
        action: &Tensor,
    ) -> candle_core::Result<Tensor>;
}

fn lock(varmap: &VarMap) -> Result<MutexGuard<'_, HashMap<String, Var>>> {
    varmap
        .data()
        .lock()
        .map_err(|e| anyhow!("parameter lock poisoned: {e}"))
}

fn build_mlp(
    device: &Device,
    dtype: DType,
    dims: &[(usize, usize)],
    squash: bool,
) -> Result<(VarMap, Sequential)> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, dtype, device);

    let mut network = seq();
    for (i, &(in_dim, out_dim)) in dims.iter().enumerate() {
        network = network.add(linear(in_dim, out_dim, vb.pp(format!("fc{i}")))?);
        if i + 1 < dims.len() {
            network = network.add(Activation::Relu);
        }
    }
    if squash {
        network = network.add(func(|xs| xs.tanh()));
    }
    Ok((varmap, network))
}

fn concat(parts: &[Option<&Tensor>]) -> candle_core::Result<Tensor> {
    let parts: Vec<&Tensor> = parts.iter().flatten().copied().collect();
    Tensor::cat(&parts, 1)
}


/// Two hidden ReLU layers and a tanh output, so actions lie in `[-1, 1]`.
pub struct MlpActor {
    varmap: VarMap,
    network: Sequential,
}

impl MlpActor {
    pub fn new(
        device: &Device,
        input_size: usize,
        hidden_1_size: usize,
        hidden_2_size: usize,
        size_action: usize,
    ) -> Result<Self> {
        let (varmap, network) = build_mlp(
            device,
            DType::F64,
            &[
                (input_size, hidden_1_size),
                (hidden_1_size, hidden_2_size),
                (hidden_2_size, size_action),
            ],
            true,
        )?;
        Ok(Self { varmap, network })
    }
}

impl Approximator for MlpActor {
    fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn varmap_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }
}

impl Actor for MlpActor {
    fn forward(
        &self,
        state: &Tensor,
        aux: Option<&Tensor>,
    ) -> candle_core::Result<Tensor> {
        self.network.forward(&concat(&[Some(state), aux])?)
    }
}


/// Two hidden ReLU layers and a single linear output.
pub struct MlpCritic {
    varmap: VarMap,
    network: Sequential,
}

impl MlpCritic {
    pub fn new(
        device: &Device,
        input_size: usize,
        hidden_1_size: usize,
        hidden_2_size: usize,
    ) -> Result<Self> {
        let (varmap, network) = build_mlp(
            device,
            DType::F64,
            &[
                (input_size, hidden_1_size),
                (hidden_1_size, hidden_2_size),
                (hidden_2_size, 1),
            ],
            false,
        )?;
        Ok(Self { varmap, network })
    }
}

impl Approximator for MlpCritic {
    fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn varmap_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }
}

impl Critic for MlpCritic {
    fn forward(
        &self,
        state: &Tensor,
        aux: Option<&Tensor>,
        action: &Tensor,
    ) -> candle_core::Result<Tensor> {
        self.network.forward(&concat(&[Some(action), Some(state), aux])?)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn bits(snapshot: &Snapshot) -> HashMap<String, Vec<u64>> {
        snapshot
            .iter()
            .map(|(name, t)| {
                let values = t.flatten_all().unwrap().to_vec1::<f64>().unwrap();
                (name.clone(), values.into_iter().map(f64::to_bits).collect())
            })
            .collect()
    }

    fn pair() -> (MlpCritic, MlpCritic) {
        let device = Device::Cpu;
        (
            MlpCritic::new(&device, 5, 8, 8).unwrap(),
            MlpCritic::new(&device, 5, 8, 8).unwrap(),
        )
    }

    #[test]
    fn test_hard_copy_is_bit_identical() {
        let (live, mut target) = pair();
        assert_ne!(bits(&live.snapshot().unwrap()), bits(&target.snapshot().unwrap()));

        target.track(&live, 1.0).unwrap();
        assert_eq!(bits(&live.snapshot().unwrap()), bits(&target.snapshot().unwrap()));
    }

    #[test]
    fn test_zero_tau_leaves_target_unchanged() {
        let (live, mut target) = pair();
        let before = bits(&target.snapshot().unwrap());
        target.track(&live, 0.0).unwrap();
        assert_eq!(bits(&target.snapshot().unwrap()), before);
    }

    #[test]
    fn test_soft_update_blends_parameters() {
        let (live, mut target) = pair();
        let live_params = live.snapshot().unwrap();
        let target_params = target.snapshot().unwrap();

        target.track(&live, 0.25).unwrap();
        for (name, blended) in target.snapshot().unwrap() {
            let expected = ((0.25 * &live_params[&name]).unwrap()
                + (0.75 * &target_params[&name]).unwrap())
            .unwrap();
            let diff = (blended - expected)
                .unwrap()
                .abs()
                .unwrap()
                .flatten_all()
                .unwrap()
                .max(0)
                .unwrap()
                .to_scalar::<f64>()
                .unwrap();
            assert!(diff < 1e-12, "{name} differs by {diff}");
        }
    }

    #[test]
    fn test_tau_out_of_range_is_rejected() {
        let (live, mut target) = pair();
        assert!(target.track(&live, 1.5).is_err());
        assert!(target.track(&live, -0.1).is_err());
    }

    #[test]
    fn test_restore_undoes_changes() {
        let (live, mut target) = pair();
        let before = target.snapshot().unwrap();
        target.track(&live, 0.5).unwrap();
        target.restore(&before).unwrap();
        assert_eq!(bits(&target.snapshot().unwrap()), bits(&before));
    }

    #[test]
    fn test_save_and_load_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("critic.safetensors");
        let (live, mut other) = pair();
        live.save(&path).unwrap();
        other.load(&path).unwrap();
        assert_eq!(bits(&live.snapshot().unwrap()), bits(&other.snapshot().unwrap()));
    }

    #[test]
    fn test_actor_outputs_are_bounded() {
        let device = Device::Cpu;
        let actor = MlpActor::new(&device, 4, 16, 16, 2).unwrap();
        let state = Tensor::randn(0f64, 10.0, (32, 3), &device).unwrap();
        let aux = Tensor::ones((32, 1), DType::F64, &device).unwrap();
        let actions = actor.forward(&state, Some(&aux)).unwrap();
        assert_eq!(actions.dims(), &[32, 2]);
        for row in actions.to_vec2::<f64>().unwrap() {
            assert!(row.iter().all(|a| (-1.0..=1.0).contains(a)));
        }
    }

    #[test]
    fn test_critic_outputs_one_value_per_row() {
        let device = Device::Cpu;
        let critic = MlpCritic::new(&device, 5, 8, 8).unwrap();
        let state = Tensor::zeros((7, 3), DType::F64, &device).unwrap();
        let action = Tensor::ones((7, 2), DType::F64, &device).unwrap();
        assert_eq!(critic.forward(&state, None, &action).unwrap().dims(), &[7, 1]);
    }
}
