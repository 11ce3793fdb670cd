//! hmdxr CLI tools: headless session simulation, settings inspection.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hmdxr_common::{JsonSettings, MemorySettings, Settings, SettingsProvider};
use hmdxr_runtime::sys;
use hmdxr_runtime::{
    Backends, GraphicsApi, GraphicsBinding, HeadlessSdk, HmdStatus, InstanceCreateInfo, Runtime,
    RuntimeConfig, RuntimeEvent, SessionCreateInfo, SessionState, SettingsSnapshot,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hmdxr")]
#[command(about = "hmdxr CLI tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a headless session from creation to destruction and print its events
    Simulate {
        /// Frames to render before requesting exit
        #[arg(short, long, default_value_t = 3)]
        frames: u32,

        /// Graphics API of the simulated application
        #[arg(long, value_enum, default_value_t = ApiArg::D3d11)]
        api: ApiArg,

        /// JSON settings file
        #[arg(short, long, env = "HMDXR_SETTINGS")]
        settings: Option<PathBuf>,

        /// Directory holding guardian.png
        #[arg(long, env = "HMDXR_INSTALL_DIR")]
        install_dir: Option<PathBuf>,

        /// Simulate a headset that is not on the user's head
        #[arg(long, default_value_t = false)]
        unmounted: bool,

        /// Print events as JSON lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the settings snapshot computed from a JSON settings file
    Settings {
        /// JSON settings file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show version information
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ApiArg {
    D3d11,
    D3d12,
    Vulkan,
    Opengl,
}

impl ApiArg {
    fn api(self) -> GraphicsApi {
        match self {
            Self::D3d11 => GraphicsApi::D3D11,
            Self::D3d12 => GraphicsApi::D3D12,
            Self::Vulkan => GraphicsApi::Vulkan,
            Self::Opengl => GraphicsApi::OpenGl,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::D3d11 => "XR_KHR_D3D11_enable",
            Self::D3d12 => "XR_KHR_D3D12_enable",
            Self::Vulkan => "XR_KHR_vulkan_enable2",
            Self::Opengl => "XR_KHR_opengl_enable",
        }
    }

    /// Placeholder handles; the headless backend only checks the variant.
    fn binding(self) -> GraphicsBinding {
        match self {
            Self::D3d11 => GraphicsBinding::D3D11 { device: 1 },
            Self::D3d12 => GraphicsBinding::D3D12 { device: 1, queue: 2 },
            Self::Vulkan => GraphicsBinding::Vulkan {
                instance: 1,
                physical_device: 2,
                device: 3,
                queue_family_index: 0,
                queue_index: 0,
            },
            Self::Opengl => GraphicsBinding::OpenGlWin32 { hdc: 1, hglrc: 2 },
        }
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    let provider: Arc<dyn SettingsProvider> = match path {
        Some(path) => Arc::new(
            JsonSettings::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        ),
        None => Arc::new(MemorySettings::new()),
    };
    Ok(Settings::new(provider))
}

struct EventPrinter {
    json: bool,
}

impl EventPrinter {
    fn drain(&self, runtime: &mut Runtime, instance: sys::Instance) -> Result<()> {
        while let Some(event) = runtime.poll_event(instance)? {
            let RuntimeEvent::SessionStateChanged { state, time, .. } = event;
            if self.json {
                let line = serde_json::json!({
                    "event": "session_state_changed",
                    "state": state.as_str(),
                    "time_ns": time.as_nanos(),
                });
                println!("{line}");
            } else {
                println!("{:>14}  t={:.3}ms", state, time.as_nanos() as f64 / 1e6);
            }
        }
        Ok(())
    }
}

fn simulate(
    frames: u32,
    api: ApiArg,
    settings: Settings,
    install_dir: Option<PathBuf>,
    unmounted: bool,
    json: bool,
) -> Result<()> {
    let config = match install_dir {
        Some(dir) => RuntimeConfig::new(dir),
        None => RuntimeConfig::from_env(),
    };
    let sdk = Arc::new(HeadlessSdk::new());
    sdk.set_status(HmdStatus {
        visible: true,
        mounted: !unmounted,
    });

    let mut runtime = Runtime::new(config, settings, Backends::headless(sdk.clone()));
    let printer = EventPrinter { json };

    let instance = runtime.create_instance(&InstanceCreateInfo {
        application_name: "hmdxr-simulate".to_string(),
        engine_name: "hmdxr".to_string(),
        api_version: sys::Version::new(1, 0, 0),
        enabled_extensions: vec![api.extension().to_string()],
    })?;
    let system = runtime.get_system(instance, sys::FormFactor::HEAD_MOUNTED_DISPLAY)?;
    runtime.graphics_requirements(instance, system, api.api())?;

    let session = runtime.create_session(
        instance,
        &SessionCreateInfo {
            system_id: system,
            create_flags: 0,
            bindings: vec![api.binding()],
        },
    )?;
    printer.drain(&mut runtime, instance)?;

    runtime.begin_session(session, sys::ViewConfigurationType::PRIMARY_STEREO)?;
    for _ in 0..frames {
        let frame = runtime.wait_frame(session)?;
        runtime.begin_frame(session)?;
        runtime.end_frame(session, frame.predicted_display_time, Vec::new())?;
        printer.drain(&mut runtime, instance)?;
    }

    runtime.request_exit_session(session)?;
    // Exit requested before the first frame completes only takes effect after one.
    while runtime.session_state() != SessionState::Stopping {
        let frame = runtime.wait_frame(session)?;
        runtime.begin_frame(session)?;
        runtime.end_frame(session, frame.predicted_display_time, Vec::new())?;
    }
    runtime.end_session(session)?;
    printer.drain(&mut runtime, instance)?;

    let counters = runtime
        .session()
        .map(|session| session.counters())
        .unwrap_or_default();
    runtime.destroy_session(session)?;
    runtime.destroy_instance(instance)?;

    info!(
        frames = counters.total,
        submitted = sdk.submitted_frames(),
        "simulation finished"
    );
    Ok(())
}

fn main() -> Result<()> {
    hmdxr_common::init_tracing();

    let args = Args::parse();

    match args.command {
        Command::Simulate {
            frames,
            api,
            settings,
            install_dir,
            unmounted,
            json,
        } => {
            let settings = load_settings(settings.as_ref())?;
            simulate(frames, api, settings, install_dir, unmounted, json)?;
        }
        Command::Settings { file } => {
            let settings = load_settings(Some(&file))?;
            let snapshot = SettingsSnapshot::load(&settings);
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Version => {
            println!("hmdxr {}", env!("CARGO_PKG_VERSION"));
            let api = sys::CURRENT_API_VERSION;
            println!("OpenXR {}.{}.{}", api.major(), api.minor(), api.patch());
        }
    }

    Ok(())
}
