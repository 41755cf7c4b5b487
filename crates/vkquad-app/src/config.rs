// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use vkquad_render_vk::{ContextConfig, ShaderPaths};

pub const DEFAULT_CONFIG: &str = "vkquad.toml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file to read
    #[arg(long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Force validation layers on or off
    #[arg(long)]
    pub validation: Option<bool>,

    /// Directory holding <name>.vert.spv / <name>.frag.spv
    #[arg(long)]
    pub shader_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: 640,
            height: 480,
            title: "Vulkan 2D".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ShaderCfg {
    pub dir: PathBuf,
    pub name: String,
}

impl Default for ShaderCfg {
    fn default() -> Self {
        ShaderCfg {
            dir: PathBuf::from("res/shaders"),
            name: "quad".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct GpuCfg {
    pub validation: bool,
}

impl Default for GpuCfg {
    fn default() -> Self {
        GpuCfg {
            validation: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub shaders: ShaderCfg,
    #[serde(default)]
    pub gpu: GpuCfg,
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Missing file means defaults; a broken file is reported and ignored.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => match Self::parse(&s) {
                Ok(cfg) => {
                    info!("config: loaded {}", path.display());
                    cfg
                }
                Err(e) => {
                    warn!("config: {} is invalid, using defaults: {e}", path.display());
                    AppCfg::default()
                }
            },
            Err(_) => AppCfg::default(),
        }
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(on) = args.validation {
            self.gpu.validation = on;
        }
        if let Some(dir) = &args.shader_dir {
            self.shaders.dir = dir.clone();
        }
    }

    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            validation: self.gpu.validation,
            shaders: ShaderPaths::new(&self.shaders.dir, &self.shaders.name),
            ..ContextConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = AppCfg::parse("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!((cfg.window.width, cfg.window.height), (640, 480));
        assert_eq!(cfg.window.title, "Vulkan 2D");
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let cfg = AppCfg::parse(
            r#"
            [window]
            width = 1024

            [shaders]
            name = "tri"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.width, 1024);
        assert_eq!(cfg.window.height, 480);
        assert_eq!(cfg.shaders.dir, PathBuf::from("res/shaders"));
        assert_eq!(cfg.shaders.name, "tri");
    }

    #[test]
    fn shader_paths_resolve_from_config() {
        let cfg = AppCfg::parse("[shaders]\ndir = \"assets\"\n").unwrap();
        let ctx = cfg.context_config();
        assert_eq!(ctx.shaders.vertex, PathBuf::from("assets/quad.vert.spv"));
        assert_eq!(ctx.shaders.fragment, PathBuf::from("assets/quad.frag.spv"));
    }

    #[test]
    fn bad_types_are_rejected() {
        assert!(AppCfg::parse("[window]\nwidth = \"wide\"\n").is_err());
    }

    #[test]
    fn cli_overrides_file() {
        let mut cfg = AppCfg::parse("[gpu]\nvalidation = false\n").unwrap();
        let args = Args::parse_from([
            "vkquad",
            "--validation",
            "true",
            "--shader-dir",
            "/tmp/spv",
        ]);
        cfg.apply_args(&args);
        assert!(cfg.gpu.validation);
        assert_eq!(cfg.shaders.dir, PathBuf::from("/tmp/spv"));
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG));
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = AppCfg::load(Path::new("definitely/not/here.toml"));
        assert_eq!(cfg, AppCfg::default());
    }
}
