use {
    anyhow::Result,
    serde::{
        de::DeserializeOwned,
        Serialize,
    },
    std::{
        fs::File,
        io::{
            Read,
            Write,
        },
        path::Path,
    },
};


/// Write a config as pretty-printed RON.
pub fn write_config<C: Serialize, P: AsRef<Path>>(
    config: &C,
    path: P,
) -> Result<()> {
    File::create(path)?.write_all(
        ron::ser::to_string_pretty(
            config,
            ron::ser::PrettyConfig::default(),
        )?.as_bytes()
    )?;
    Ok(())
}

/// Read a config written by [`write_config`].
pub fn read_config<C: DeserializeOwned, P: AsRef<Path>>(
    path: P,
) -> Result<C> {
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;
    Ok(ron::from_str(&contents)?)
}


#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::configs::{
            DDPGConfig,
            TrainConfig,
        },
    };

    #[test]
    fn test_configs_survive_ron() {
        let dir = tempfile::tempdir().unwrap();

        let mut ddpg = DDPGConfig::pendulum();
        ddpg.seed = Some(42);
        write_config(&ddpg, dir.path().join("ddpg.ron")).unwrap();
        assert_eq!(read_config::<DDPGConfig, _>(dir.path().join("ddpg.ron")).unwrap(), ddpg);

        let train = TrainConfig::pendulum();
        write_config(&train, dir.path().join("train.ron")).unwrap();
        assert_eq!(read_config::<TrainConfig, _>(dir.path().join("train.ron")).unwrap(), train);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: DDPGConfig = ron::from_str("(gamma: 0.5, priority_scale: 0.0)").unwrap();
        assert_eq!(config.gamma, 0.5);
        assert_eq!(config.priority_scale, 0.0);
        assert_eq!(config.replace_target, DDPGConfig::default().replace_target);
    }
}
