//! open-razer CLI: command-line Razer mouse configuration tool.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use open_razer_core::capability::{CapabilityTable, Zone};
use open_razer_core::config::{self, EngineConfig};
use open_razer_core::device::{self, DeviceInfo, PollingRate};
use open_razer_core::dpi_stages::DpiStage;
use open_razer_core::error::Error as CoreError;
use open_razer_core::lighting::{self, Breath, Effect, Rgb, WaveDirection};
use open_razer_core::remap::{InputEvent, InputRemapper};
use open_razer_core::report::{Status, REPORT_LEN};
use open_razer_core::retry::{check_device_status, DeviceStatus};
use open_razer_core::surface::{self, Attribute};
use open_razer_core::{dpi, info, power, report_rate, DeviceSession, Transport};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Poll interval while the device reports busy.
const BUSY_POLL: Duration = Duration::from_millis(1);

/// Feature-report transport over hidapi.
///
/// hidapi addresses the interface the device was opened on, so the channel
/// indices are only logged.
struct HidapiTransport {
    device: Mutex<hidapi::HidDevice>,
}

impl HidapiTransport {
    fn open(info: &DeviceInfo) -> Result<Self> {
        let api = hidapi::HidApi::new().map_err(|e| anyhow!("hidapi init: {e}"))?;
        let path = std::ffi::CString::new(info.path.clone())?;
        let device = api.open_path(&path).map_err(|e| {
            anyhow!(
                "open HID device {} (VID=0x{:04X} PID=0x{:04X}): {e}",
                info.name,
                info.vid,
                info.pid
            )
        })?;
        Ok(Self {
            device: Mutex::new(device),
        })
    }
}

impl Transport for HidapiTransport {
    fn exchange(
        &self,
        channel_index: u8,
        request: &[u8; REPORT_LEN],
        response_channel_index: u8,
        min_wait: Duration,
        max_wait: Duration,
    ) -> open_razer_core::Result<Vec<u8>> {
        let device = self.device.lock();
        trace!(channel_index, response_channel_index, "Sending feature report");

        // Report ID 0 precedes the report body.
        let mut out = [0u8; REPORT_LEN + 1];
        out[1..].copy_from_slice(request);
        device
            .send_feature_report(&out)
            .map_err(|e| CoreError::Transport(format!("send_feature_report: {e}")))?;

        std::thread::sleep(min_wait);
        let deadline = Instant::now() + max_wait.saturating_sub(min_wait);
        loop {
            let mut buf = [0u8; REPORT_LEN + 1];
            let n = device
                .get_feature_report(&mut buf)
                .map_err(|e| CoreError::Transport(format!("get_feature_report: {e}")))?;
            if n < REPORT_LEN + 1 {
                return Err(CoreError::Transport(format!(
                    "short feature report: {n} bytes"
                )));
            }
            let body = buf[1..].to_vec();
            let busy = Status::from_byte(body[0]) == Status::Busy;
            if !busy || Instant::now() >= deadline {
                return Ok(body);
            }
            std::thread::sleep(BUSY_POLL);
        }
    }
}

#[derive(Parser)]
#[command(name = "open-razer", version, about = "Open-source Razer mouse configuration")]
struct Cli {
    /// Which device to use when several are connected (see list-devices).
    #[arg(long, short = 'd', global = true, default_value_t = 0)]
    device_index: usize,

    /// Config file; defaults to $OPEN_RAZER_CONFIG or the XDG location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected Razer mice.
    ListDevices,
    /// List models in the device database.
    Models,
    /// Show firmware, serial, mode and supported attributes.
    Info,
    /// Get current DPI.
    GetDpi,
    /// Set DPI; Y defaults to X.
    SetDpi { x: u16, y: Option<u16> },
    /// Show the DPI stage list.
    GetStages,
    /// Set the DPI stage list, e.g. `set-stages 2 400 800:800 1600`.
    SetStages {
        /// Active stage, 1-based.
        active: u8,
        /// Stages as DPI or X:Y.
        stages: Vec<String>,
    },
    /// Get current polling rate.
    GetRate,
    /// Set polling rate (125, 250, 500, or 1000 Hz).
    SetRate { hz: u16 },
    /// Get or set zone brightness.
    Brightness { zone: Zone, level: Option<u8> },
    /// Apply a lighting effect to a zone.
    Effect {
        zone: Zone,
        /// none, static, blinking, breath, spectrum, reactive, wave, custom.
        effect: String,
        /// Colours as rrggbb; wave takes left or right, reactive a speed first.
        args: Vec<String>,
    },
    /// Upload one custom-frame row: row, first column, then one colour per column.
    Frame {
        zone: Zone,
        row: u8,
        start: u8,
        colors: Vec<Rgb>,
    },
    /// Battery level and charging status.
    Battery,
    /// Get or set the idle sleep time in seconds.
    Idle { seconds: Option<u16> },
    /// Get or set the raw low-battery threshold.
    LowBattery { raw: Option<u8> },
    /// Dock charging light: a static rrggbb colour, or the current effect if omitted.
    Charge { color: Option<Rgb> },
    /// Read an attribute by name.
    AttrRead { name: String },
    /// Write an attribute. Values are hex bytes, or text with --text.
    AttrWrite {
        name: String,
        value: String,
        #[arg(long)]
        text: bool,
    },
    /// Print synthesized input events until the device goes away.
    Monitor,
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    let path = match path {
        Some(p) => p,
        None => config::config_path()?,
    };
    Ok(EngineConfig::load(&path)?)
}

fn select_device(table: &CapabilityTable, index: usize) -> Result<DeviceInfo> {
    let mut devices = device::discover_devices(table)?;
    if index >= devices.len() {
        bail!(
            "No Razer device at index {index} ({} found)",
            devices.len()
        );
    }
    Ok(devices.swap_remove(index))
}

fn open_session(cli: &Cli, config: &EngineConfig) -> Result<(DeviceSession, DeviceInfo)> {
    let table = config.capability_table()?;
    let info = select_device(&table, cli.device_index)?;
    let transport = Arc::new(HidapiTransport::open(&info)?);
    let session = DeviceSession::attach(table, info.model, transport)?.with_policy(config.truncation);
    debug!(model = %info.model, "Session open");
    Ok((session, info))
}

fn parse_stage(s: &str) -> Result<DpiStage> {
    let (x, y) = match s.split_once(':') {
        Some((x, y)) => (x.parse()?, y.parse()?),
        None => {
            let v = s.parse()?;
            (v, v)
        }
    };
    Ok(DpiStage::new(x, y))
}

fn parse_effect(name: &str, args: &[String]) -> Result<Effect> {
    let colors = || -> Result<Vec<Rgb>> {
        args.iter()
            .map(|a| a.parse::<Rgb>().map_err(anyhow::Error::from))
            .collect()
    };
    let one_color = || -> Result<Rgb> {
        colors()?
            .first()
            .copied()
            .ok_or_else(|| anyhow!("{name} needs a colour"))
    };
    let effect = match name {
        "none" | "off" => Effect::Off,
        "static" => Effect::Static(one_color()?),
        "blinking" => Effect::Blink(one_color()?),
        "breath" => match colors()?.as_slice() {
            [] => Effect::Breathe(Breath::Random),
            [c] => Effect::Breathe(Breath::Single(*c)),
            [a, b, ..] => Effect::Breathe(Breath::Dual(*a, *b)),
        },
        "spectrum" => Effect::Spectrum,
        "custom" => Effect::Custom,
        "wave" => match args.first().map(String::as_str) {
            Some("left") | None => Effect::Wave(WaveDirection::Left),
            Some("right") => Effect::Wave(WaveDirection::Right),
            Some(other) => bail!("unknown wave direction '{other}'"),
        },
        "reactive" => {
            let (speed, color) = match args {
                [speed, color, ..] => (speed.parse()?, color.parse()?),
                _ => bail!("reactive needs a speed and a colour"),
            };
            Effect::Reactive { speed, color }
        }
        other => bail!(
            "Unknown effect '{other}'. Valid effects: none, static, blinking, breath, spectrum, reactive, wave, custom"
        ),
    };
    Ok(effect)
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let hex: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if hex.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).context("bad hex byte"))
        .collect()
}

/// Last column of a frame of `count` colours starting at `start`.
fn frame_end(start: u8, count: usize) -> Result<u8> {
    if count == 0 {
        bail!("frame needs at least one colour");
    }
    u8::try_from(count - 1)
        .ok()
        .and_then(|span| start.checked_add(span))
        .ok_or_else(|| anyhow!("{count} colours from column {start} run past column 255"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.clone())?;

    match &cli.command {
        Commands::ListDevices => {
            let table = config.capability_table()?;
            let devices = device::discover_devices(&table)?;
            if devices.is_empty() {
                println!("No Razer mice found.");
                println!("Ensure your mouse is connected and you can access its hidraw node.");
            }
            for (i, dev) in devices.iter().enumerate() {
                println!(
                    "[{i}] {} (VID: 0x{:04X}, PID: 0x{:04X}, path: {})",
                    dev.name, dev.vid, dev.pid, dev.path
                );
            }
        }
        Commands::Models => {
            let table = config.capability_table()?;
            for entry in table.models() {
                println!("{} {} ({:?})", entry.id, entry.name, entry.dialect);
            }
        }
        Commands::Info => {
            let (session, dev) = open_session(&cli, &config)?;
            println!("{} ({})", dev.name, dev.model);
            match check_device_status(&session) {
                DeviceStatus::Connected => {}
                DeviceStatus::PermissionError => bail!("Permission denied opening {}", dev.path),
                status => bail!("Device not responding: {status:?}"),
            }
            println!("  Firmware: {}", info::read_firmware_version(&session)?);
            if let Ok(serial) = info::read_serial(&session) {
                println!("  Serial:   {serial}");
            }
            if let Ok((mode, param)) = info::read_device_mode(&session) {
                println!("  Mode:     {mode}:{param}");
            }
            println!("  Attributes:");
            for attr in surface::attributes(session.entry()) {
                let rw = match (attr.is_readable(session.entry()), attr.is_writable(session.entry())) {
                    (true, true) => "rw",
                    (true, false) => "r-",
                    _ => "-w",
                };
                println!("    {rw} {attr}");
            }
        }
        Commands::GetDpi => {
            let (session, _) = open_session(&cli, &config)?;
            let (x, y) = dpi::read_dpi(&session)?;
            println!("Current DPI: {x}x{y}");
        }
        Commands::SetDpi { x, y } => {
            let (session, _) = open_session(&cli, &config)?;
            let (x, y) = dpi::write_dpi(&session, *x, y.unwrap_or(*x))?;
            println!("DPI set to {x}x{y}");
        }
        Commands::GetStages => {
            let (session, _) = open_session(&cli, &config)?;
            let (active, stages) = dpi::read_dpi_stages(&session)?;
            for (i, s) in stages.iter().enumerate() {
                let marker = if i + 1 == active as usize { '*' } else { ' ' };
                println!("{marker} {}: {}x{}", i + 1, s.x, s.y);
            }
        }
        Commands::SetStages { active, stages } => {
            let stages = stages
                .iter()
                .map(|s| parse_stage(s))
                .collect::<Result<Vec<_>>>()?;
            let (session, _) = open_session(&cli, &config)?;
            dpi::write_dpi_stages(&session, &stages, *active)?;
            println!("Set {} stage(s), active {active}", stages.len());
        }
        Commands::GetRate => {
            let (session, _) = open_session(&cli, &config)?;
            let rate = report_rate::read_polling_rate(&session)?;
            println!("Current polling rate: {rate}");
        }
        Commands::SetRate { hz } => {
            let rate = PollingRate::from_hz(*hz)
                .ok_or_else(|| anyhow!("Unsupported polling rate {hz}. Valid rates: 125, 250, 500, 1000"))?;
            let (session, _) = open_session(&cli, &config)?;
            report_rate::write_polling_rate(&session, rate)?;
            println!("Polling rate set to {rate}");
        }
        Commands::Brightness { zone, level } => {
            let (session, _) = open_session(&cli, &config)?;
            match level {
                Some(level) => {
                    lighting::write_brightness(&session, *zone, *level)?;
                    println!("{zone} brightness set to {level}");
                }
                None => println!("{zone} brightness: {}", lighting::read_brightness(&session, *zone)?),
            }
        }
        Commands::Effect { zone, effect, args } => {
            let effect = parse_effect(effect, args)?;
            let (session, _) = open_session(&cli, &config)?;
            lighting::set_effect(&session, *zone, effect)?;
            println!("{zone}: {}", effect.name());
        }
        Commands::Frame {
            zone,
            row,
            start,
            colors,
        } => {
            let end = frame_end(*start, colors.len())?;
            let rgb: Vec<u8> = colors.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
            let (session, _) = open_session(&cli, &config)?;
            lighting::write_custom_frame(&session, *zone, *row, *start, end, &rgb)?;
            println!("{zone} row {row}: columns {start}..={end} uploaded");
        }
        Commands::Battery => {
            let (session, _) = open_session(&cli, &config)?;
            let raw = power::read_battery_level(&session)?;
            let charging = power::read_charging_status(&session)?;
            println!(
                "Battery: {}%{}",
                power::battery_percent(raw),
                if charging { " (charging)" } else { "" }
            );
        }
        Commands::Charge { color } => {
            let (session, _) = open_session(&cli, &config)?;
            match color {
                Some(c) => {
                    power::write_charge_color(&session, *c)?;
                    println!("Charging colour set to {c}");
                }
                None => {
                    power::write_charge_effect(&session, power::ChargeEffect::Matrix)?;
                    println!("Charging shows the current effect");
                }
            }
        }
        Commands::Idle { seconds } => {
            let (session, _) = open_session(&cli, &config)?;
            match seconds {
                Some(s) => {
                    power::write_idle_time(&session, *s)?;
                    println!("Idle time set to {s}s");
                }
                None => println!("Idle time: {}s", power::read_idle_time(&session)?),
            }
        }
        Commands::LowBattery { raw } => {
            let (session, _) = open_session(&cli, &config)?;
            match raw {
                Some(r) => {
                    power::write_low_battery_threshold(&session, *r)?;
                    println!("Low-battery threshold set to 0x{r:02X}");
                }
                None => println!(
                    "Low-battery threshold: 0x{:02X}",
                    power::read_low_battery_threshold(&session)?
                ),
            }
        }
        Commands::AttrRead { name } => {
            let attr: Attribute = name.parse()?;
            let (session, _) = open_session(&cli, &config)?;
            print!("{}", surface::read_attribute(&session, attr)?);
        }
        Commands::AttrWrite { name, value, text } => {
            let attr: Attribute = name.parse()?;
            let data = if *text {
                value.as_bytes().to_vec()
            } else {
                parse_hex_bytes(value)?
            };
            let (session, _) = open_session(&cli, &config)?;
            let n = surface::write_attribute(&session, attr, &data)?;
            println!("{attr}: wrote {n} byte(s)");
        }
        Commands::Monitor => monitor(&cli, &config)?,
    }

    Ok(())
}

/// Read input reports from the mouse's non-control interface and print the
/// events the remapper synthesizes.
fn monitor(cli: &Cli, config: &EngineConfig) -> Result<()> {
    let table = config.capability_table()?;
    let info = select_device(&table, cli.device_index)?;
    let entry = table
        .entry(info.model)
        .ok_or_else(|| anyhow!("no capability entry for {}", info.model))?
        .clone();

    let api = hidapi::HidApi::new().map_err(|e| anyhow!("hidapi init: {e}"))?;
    let input_path = api
        .device_list()
        .find(|d| d.vendor_id() == info.vid && d.product_id() == info.pid && d.interface_number() > 0)
        .map(|d| d.path().to_owned())
        .ok_or_else(|| anyhow!("{} has no input interface", info.name))?;
    let input = api
        .open_path(&input_path)
        .map_err(|e| anyhow!("open input interface: {e}"))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(async move {
        let sink = Arc::new(|event: InputEvent| println!("{event:?}"));
        let remapper = InputRemapper::new(sink, config.remap_config(&entry));
        let transport = Arc::new(HidapiTransport::open(&info)?);
        let session = DeviceSession::attach(table, info.model, transport)?.with_input(remapper);
        println!("Monitoring {} (Ctrl-C to stop)", info.name);

        let session = Arc::new(session);
        let reader = session.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<()> {
            let mut buf = [0u8; 64];
            loop {
                let n = input.read(&mut buf).map_err(|e| anyhow!("read input report: {e}"))?;
                if n > 0 && !reader.handle_input(&buf[..n]) {
                    trace!(len = n, "Unrecognized input report");
                }
            }
        })
        .await?;

        if let Ok(session) = Arc::try_unwrap(session) {
            session.detach();
        }
        result
    })
}
