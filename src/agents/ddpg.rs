use {
    super::{
        Algorithm,
        ConfigurableAlgorithm,
        LearnStep,
        OffPolicyAlgorithm,
        SaveableAlgorithm,
    },
    crate::{
        components::{
            Action,
            Actor,
            Approximator,
            Critic,
            GaussianNoise,
            MlpActor,
            MlpCritic,
            PrioritizedReplayBuffer,
            ReplayBufferConfig,
            Sample,
            TensorBatch,
        },
        configs::DDPGConfig,
    },
    anyhow::{
        bail,
        Result,
    },
    candle_core::{
        Device,
        Tensor,
    },
    candle_nn::{
        AdamW,
        Optimizer,
        ParamsAdamW,
    },
    rand::{
        rngs::StdRng,
        SeedableRng,
    },
    std::{
        fs::create_dir_all,
        path::Path,
    },
    tracing::{
        debug,
        info,
        warn,
    },
};


/// Deep Deterministic Policy Gradient with prioritized experience replay.
///
/// The agent owns a live and a target copy of both the actor and the critic.
/// The targets start out as exact copies and afterwards only follow the live
/// networks through [`update_network_parameters`](Self::update_network_parameters).
#[allow(clippy::upper_case_acronyms)]
pub struct DDPG<A = MlpActor, C = MlpCritic> {
    actor: A,
    target_actor: A,
    actor_optim: AdamW,
    critic: C,
    target_critic: C,
    critic_optim: AdamW,
    replay_buffer: PrioritizedReplayBuffer,
    noise: GaussianNoise,
    rng: StdRng,
    device: Device,
    learn_steps: usize,

    size_state: usize,
    size_aux: usize,
    size_action: usize,
    config: DDPGConfig,
}

impl<A: Actor, C: Critic> DDPG<A, C> {
    /// Assemble an agent from four approximators.
    ///
    /// The live and target networks of each pair must share an architecture,
    /// the targets are overwritten with the live parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &Device,
        config: &DDPGConfig,
        actor: A,
        target_actor: A,
        critic: C,
        target_critic: C,
        size_state: usize,
        size_aux: usize,
        size_action: usize,
    ) -> Result<Self> {
        if config.replace_target == 0 {
            bail!("replace_target must be positive");
        }

        let actor_optim = AdamW::new(
            actor.vars(),
            ParamsAdamW {
                lr: config.actor_learning_rate,
                ..Default::default()
            },
        )?;
        let critic_optim = AdamW::new(
            critic.vars(),
            ParamsAdamW {
                lr: config.critic_learning_rate,
                ..Default::default()
            },
        )?;

        let replay_buffer = PrioritizedReplayBuffer::new(ReplayBufferConfig {
            capacity: config.replay_buffer_capacity,
            state_dims: size_state,
            aux_dims: size_aux,
            n_actions: size_action,
            discrete: config.discrete_actions,
        })?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut agent = Self {
            actor,
            target_actor,
            actor_optim,
            critic,
            target_critic,
            critic_optim,
            replay_buffer,
            noise: GaussianNoise::new(config.exploration_noise)?,
            rng,
            device: device.clone(),
            learn_steps: 0,
            size_state,
            size_aux,
            size_action,
            config: config.clone(),
        };

        // this sets the target networks to be equal to the live ones using tau = 1.0
        agent.update_network_parameters(1.0)?;
        Ok(agent)
    }

    /// Blend the target networks towards the live networks:
    /// `target = tau * live + (1 - tau) * target`.
    pub fn update_network_parameters(
        &mut self,
        tau: f64,
    ) -> Result<()> {
        self.target_actor.track(&self.actor, tau)?;
        self.target_critic.track(&self.critic, tau)?;
        Ok(())
    }

    pub fn actor(&self) -> &A {
        &self.actor
    }

    pub fn target_actor(&self) -> &A {
        &self.target_actor
    }

    pub fn critic(&self) -> &C {
        &self.critic
    }

    pub fn target_critic(&self) -> &C {
        &self.target_critic
    }

    /// Number of learning steps that got past the warm-up guard.
    pub fn learn_steps(&self) -> usize {
        self.learn_steps
    }

    fn aux_tensor(
        &self,
        aux: &[f64],
    ) -> Result<Option<Tensor>> {
        if aux.len() != self.size_aux {
            bail!("expected {} auxiliary features, got {}", self.size_aux, aux.len());
        }
        Ok(if self.size_aux == 0 {
            None
        } else {
            Some(Tensor::from_slice(aux, (1, self.size_aux), &self.device)?)
        })
    }

    fn do_choose_action(
        &mut self,
        observation: &[f64],
        aux: &[f64],
        evaluate: bool,
    ) -> Result<Vec<f64>> {
        if observation.len() != self.size_state {
            bail!("expected an observation of size {}, got {}", self.size_state, observation.len());
        }
        // Candle assumes a batch dimension, so we pretend we have a batch of one.
        let state = Tensor::from_slice(observation, (1, self.size_state), &self.device)?;
        let aux = self.aux_tensor(aux)?;
        let mut actions = self
            .actor
            .forward(&state, aux.as_ref())?
            .squeeze(0)?
            .to_vec1::<f64>()?;

        if !evaluate {
            let noise = self.noise.sample(&mut self.rng, self.size_action);
            actions.iter_mut().zip(noise).for_each(|(a, n)| *a += n);
        }
        Ok(actions)
    }

    /// Bootstrapped critic targets `r + gamma * (1 - done) * Q'(s', mu'(s'))`,
    /// computed with the target networks and detached from the graph.
    pub fn critic_targets(
        &self,
        batch: &TensorBatch,
    ) -> Result<Tensor> {
        let next_actions = self
            .target_actor
            .forward(&batch.next_states, batch.next_aux.as_ref())?;
        let q_next = self
            .target_critic
            .forward(&batch.next_states, batch.next_aux.as_ref(), &next_actions)?;
        // terminals hold 1 - done
        Ok((&batch.rewards + ((self.config.gamma * q_next)? * &batch.terminals)?)?.detach())
    }

    /// Mean squared error of the critic against `targets`, each row scaled
    /// by its importance weight.
    pub fn critic_loss(
        &self,
        batch: &TensorBatch,
        targets: &Tensor,
        weights: &Tensor,
    ) -> Result<Tensor> {
        let q = self
            .critic
            .forward(&batch.states, batch.aux.as_ref(), &batch.actions)?;
        Ok((weights * (targets - q)?.sqr()?)?.mean_all()?)
    }

    /// `targets - Q(s, a)` for every row of the batch.
    pub fn td_errors(
        &self,
        batch: &TensorBatch,
        targets: &Tensor,
    ) -> Result<Vec<f64>> {
        let q = self
            .critic
            .forward(&batch.states, batch.aux.as_ref(), &batch.actions)?;
        Ok((targets - q)?.squeeze(1)?.to_vec1::<f64>()?)
    }

    fn do_learn(&mut self) -> Result<LearnStep> {
        let stored = self.replay_buffer.len();
        if stored < self.config.min_replay_size {
            debug!(stored, required = self.config.min_replay_size, "warming up");
            return Ok(LearnStep::WarmingUp {
                stored,
                required: self.config.min_replay_size,
            });
        }

        let Sample { batch, weights, indices } = self.replay_buffer.sample(
            self.config.training_batch_size,
            self.config.priority_scale,
            &mut self.rng,
        )?;
        let weights = Tensor::from_vec(weights, (batch.batch_size, 1), &self.device)?;
        let batch = batch.to_tensors(&self.device)?;

        let targets = self.critic_targets(&batch)?;
        let critic_loss = self.critic_loss(&batch, &targets, &weights)?;
        self.critic_optim.backward_step(&critic_loss)?;

        let actor_loss = self
            .critic
            .forward(
                &batch.states,
                batch.aux.as_ref(),
                &self.actor.forward(&batch.states, batch.aux.as_ref())?,
            )?
            .mean_all()?
            .neg()?;
        self.actor_optim.backward_step(&actor_loss)?;

        let td_errors = self.td_errors(&batch, &targets)?;
        self.replay_buffer
            .update_priorities(&indices, &td_errors, self.config.priority_offset)?;

        self.learn_steps += 1;
        let target_synced = self.learn_steps % self.config.replace_target == 0;
        if target_synced {
            self.update_network_parameters(self.config.tau)?;
            info!(learn_steps = self.learn_steps, "target networks updated");
        }

        let step = LearnStep::Trained {
            critic_loss: critic_loss.to_scalar::<f64>()?,
            actor_loss: actor_loss.to_scalar::<f64>()?,
            mean_abs_td_error: td_errors.iter().map(|e| e.abs()).sum::<f64>() / td_errors.len() as f64,
            target_synced,
        };
        debug!(?step, "learning step");
        Ok(step)
    }

    #[allow(clippy::too_many_arguments)]
    fn do_remember(
        &mut self,
        state: &[f64],
        aux: &[f64],
        action: Action<'_>,
        reward: f64,
        next_state: &[f64],
        next_aux: &[f64],
        done: bool,
    ) -> Result<()> {
        info!(
            concat!(
                "\nPushing to replay buffer:",
                "\n{state:?}",
                "\n{action:?}",
                "\n{reward:?}",
                "\n{next_state:?}",
            ),
            state = state,
            action = action,
            reward = reward,
            next_state = next_state,
        );
        self.replay_buffer
            .store_transition_with_aux(state, aux, action, reward, next_state, next_aux, done)?;
        Ok(())
    }
}

impl<A: Actor, C: Critic> Algorithm for DDPG<A, C> {
    type Config = DDPGConfig;

    fn config(&self) -> &Self::Config {
        &self.config
    }

    fn choose_action(
        &mut self,
        observation: &[f64],
        aux: &[f64],
        evaluate: bool,
    ) -> Result<Vec<f64>> {
        self.do_choose_action(observation, aux, evaluate)
    }

    fn learn(&mut self) -> Result<LearnStep> {
        self.do_learn()
    }
}

impl ConfigurableAlgorithm for DDPG {
    fn from_config(
        device: &Device,
        config: &DDPGConfig,
        size_state: usize,
        size_aux: usize,
        size_action: usize,
    ) -> Result<Box<Self>> {
        let size_input = size_state + size_aux;
        let actor = || {
            MlpActor::new(
                device,
                size_input,
                config.hidden_1_size,
                config.hidden_2_size,
                size_action,
            )
        };
        let critic = || {
            MlpCritic::new(
                device,
                size_input + size_action,
                config.hidden_1_size,
                config.hidden_2_size,
            )
        };
        Ok(Box::new(Self::new(
            device,
            config,
            actor()?,
            actor()?,
            critic()?,
            critic()?,
            size_state,
            size_aux,
            size_action,
        )?))
    }
}

impl<A: Actor, C: Critic> OffPolicyAlgorithm for DDPG<A, C> {
    fn remember(
        &mut self,
        state: &[f64],
        aux: &[f64],
        action: Action<'_>,
        reward: f64,
        next_state: &[f64],
        next_aux: &[f64],
        done: bool,
    ) -> Result<()> {
        self.do_remember(state, aux, action, reward, next_state, next_aux, done)
    }

    fn replay_buffer(&self) -> &PrioritizedReplayBuffer {
        &self.replay_buffer
    }

    fn replay_buffer_mut(&mut self) -> &mut PrioritizedReplayBuffer {
        &mut self.replay_buffer
    }
}

impl<A: Actor, C: Critic> SaveableAlgorithm for DDPG<A, C> {
    /// Write the four networks as `{name}_{role}.safetensors` into `path`.
    fn save<P: AsRef<Path> + ?Sized>(
        &self,
        path: &P,
        name: &str,
    ) -> Result<()> {
        let path = path.as_ref();
        create_dir_all(path)?;
        self.actor.save(&path.join(format!("{name}_actor.safetensors")))?;
        self.target_actor.save(&path.join(format!("{name}_target_actor.safetensors")))?;
        self.critic.save(&path.join(format!("{name}_critic.safetensors")))?;
        self.target_critic.save(&path.join(format!("{name}_target_critic.safetensors")))?;
        Ok(())
    }

    fn load<P: AsRef<Path> + ?Sized>(
        &mut self,
        path: &P,
        name: &str,
    ) -> Result<()> {
        let path = path.as_ref();
        self.actor.load(&path.join(format!("{name}_actor.safetensors")))?;
        self.target_actor.load(&path.join(format!("{name}_target_actor.safetensors")))?;
        self.critic.load(&path.join(format!("{name}_critic.safetensors")))?;
        self.target_critic.load(&path.join(format!("{name}_target_critic.safetensors")))?;
        warn!("Loaded model weights from {path:?} with name {name}");
        Ok(())
    }
}
