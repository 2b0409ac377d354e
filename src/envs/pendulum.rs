use {
    super::{
        Environment,
        Step,
    },
    anyhow::{
        bail,
        Result,
    },
    rand::{
        rngs::StdRng,
        Rng,
        SeedableRng,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        f64::consts::PI,
        ops::RangeInclusive,
    },
};


/// The classic inverted pendulum swing-up task.
///
/// Actions in `[-1, 1]` are scaled to a torque in `[-max_torque, max_torque]`.
/// The observation is `(cos θ, sin θ, θ̇)` and the reward is
/// `-(θ² + 0.1 θ̇² + 0.001 u²)` with θ normalized to `[-π, π)`. Episodes never
/// terminate, they are truncated after `timelimit` steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendulumConfig {
    pub max_speed: f64,
    pub max_torque: f64,
    pub dt: f64,
    pub gravity: f64,
    pub mass: f64,
    pub length: f64,
    pub timelimit: usize,
}
impl Default for PendulumConfig {
    fn default() -> Self {
        Self {
            max_speed: 8.0,
            max_torque: 2.0,
            dt: 0.05,
            gravity: 10.0,
            mass: 1.0,
            length: 1.0,
            timelimit: 200,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PendulumEnv {
    config: PendulumConfig,
    theta: f64,
    theta_dot: f64,
    steps: usize,
    rng: StdRng,
}

impl PendulumEnv {
    fn observation(&self) -> Vec<f64> {
        vec![self.theta.cos(), self.theta.sin(), self.theta_dot]
    }
}

fn angle_normalize(x: f64) -> f64 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

impl Environment for PendulumEnv {
    type Config = PendulumConfig;

    fn config(&self) -> &Self::Config {
        &self.config
    }

    fn new(config: Self::Config) -> Result<Box<Self>> {
        Ok(Box::new(Self {
            config,
            theta: PI,
            theta_dot: 0.0,
            steps: 0,
            rng: StdRng::seed_from_u64(0),
        }))
    }

    fn reset(
        &mut self,
        seed: u64,
    ) -> Result<Vec<f64>> {
        self.rng = StdRng::seed_from_u64(seed);
        self.theta = self.rng.gen_range(-PI..=PI);
        self.theta_dot = self.rng.gen_range(-1.0..=1.0);
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(
        &mut self,
        action: &[f64],
    ) -> Result<Step> {
        if action.len() != 1 {
            bail!("pendulum expects a single action, got {}", action.len());
        }
        if self.steps >= self.config.timelimit {
            bail!("episode is over, call reset first");
        }
        let PendulumConfig { max_speed, max_torque, dt, gravity, mass, length, .. } = self.config;

        let u = (action[0] * max_torque).clamp(-max_torque, max_torque);
        let cost = angle_normalize(self.theta).powi(2)
            + 0.1 * self.theta_dot.powi(2)
            + 0.001 * u.powi(2);

        let acceleration = 3.0 * gravity / (2.0 * length) * self.theta.sin()
            + 3.0 / (mass * length.powi(2)) * u;
        self.theta_dot = (self.theta_dot + acceleration * dt).clamp(-max_speed, max_speed);
        self.theta += self.theta_dot * dt;
        self.steps += 1;

        Ok(Step {
            observation: self.observation(),
            aux: Vec::new(),
            reward: -cost,
            terminated: false,
            truncated: self.steps >= self.config.timelimit,
        })
    }

    fn timelimit(&self) -> usize {
        self.config.timelimit
    }

    fn action_space(&self) -> Vec<usize> {
        vec![1]
    }

    fn action_domain(&self) -> Vec<RangeInclusive<f64>> {
        vec![-1.0..=1.0]
    }

    fn observation_space(&self) -> Vec<usize> {
        vec![3]
    }

    fn current_observation(&self) -> Vec<f64> {
        self.observation()
    }
}
