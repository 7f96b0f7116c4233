//! 配置文件管理命令

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use scanhead_control::ScanHeadConfig;
use std::path::PathBuf;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 写出默认配置
    Init {
        /// 配置文件路径
        path: PathBuf,

        /// 覆盖已存在的文件
        #[arg(short, long)]
        force: bool,
    },

    /// 检查配置文件并打印生效值
    Check {
        /// 配置文件路径
        path: PathBuf,
    },
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Init { path, force } => Self::init_(path, force),
            ConfigCommand::Check { path } => Self::check_(path),
        }
    }

    fn init_(path: PathBuf, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!("{} 已存在（使用 --force 覆盖）", path.display());
        }
        ScanHeadConfig::default()
            .save(&path)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        println!("✅ 已写出默认配置: {}", path.display());
        Ok(())
    }

    fn check_(path: PathBuf) -> Result<()> {
        let config = ScanHeadConfig::load(&path)
            .with_context(|| format!("配置文件无效: {}", path.display()))?;
        println!("配置文件: {}", path.display());
        print!("{}", config.to_toml_string()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanhead.toml");

        ConfigCommand::Init {
            path: path.clone(),
            force: false,
        }
        .execute()
        .unwrap();
        assert_eq!(
            ScanHeadConfig::load(&path).unwrap(),
            ScanHeadConfig::default()
        );

        assert!(
            ConfigCommand::Init {
                path: path.clone(),
                force: false,
            }
            .execute()
            .is_err()
        );
        ConfigCommand::Check { path }.execute().unwrap();
    }
}
