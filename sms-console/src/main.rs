//! SMS Console
//!
//! Command-line front end for the SMS modem libraries: list ports, identify
//! modems, read and write status fields, send messages and issue raw
//! commands.

mod settings;
mod traffic;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sms_detect::{PortLister, Scanner, SerialPortInfo};
use sms_modem::{
    Device, DeviceEvent, DriverRegistry, DynSerial, FieldError, FieldValue, ModemError, PortAccess,
    TransportConfig, DEFAULT_BAUD_RATE,
};
use sms_protocol::Encoding;
use sms_sim::{VirtualModem, VirtualPorts};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use settings::Settings;

const DEFAULT_LOG_FILTER: &str =
    "sms_console=info,sms_protocol=info,sms_modem=info,sms_detect=info,sms_sim=info";

#[derive(Parser)]
#[command(name = "sms-console")]
#[command(about = "Talk to SMS modems over serial ports")]
#[command(version)]
struct Cli {
    /// Settings file (JSON)
    #[arg(short, long, env = "SMS_CONSOLE_CONFIG")]
    config: Option<PathBuf>,

    /// Use simulated modems instead of serial ports
    #[arg(long = "virtual")]
    use_virtual: bool,

    /// Print line traffic to stderr
    #[arg(short, long)]
    trace: bool,

    /// Emit results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// List registered drivers
    Drivers,

    /// List a driver's status fields
    Fields {
        /// Driver id
        driver: String,
    },

    /// Identify the modem on a port
    Scan {
        /// Port name
        port: String,

        /// Baud rate to try (repeatable); defaults to the configured list
        #[arg(short, long)]
        baud: Vec<u32>,
    },

    /// Read status fields (all readable fields when none are named)
    Read {
        #[command(flatten)]
        device: DeviceArgs,

        /// Field names
        fields: Vec<String>,
    },

    /// Write a status field
    Write {
        #[command(flatten)]
        device: DeviceArgs,

        /// Field name
        field: String,

        /// New value
        value: String,
    },

    /// Send a text message
    Send {
        #[command(flatten)]
        device: DeviceArgs,

        /// Destination number
        destination: String,

        /// Message template ({device}, {portName}, {baudRate}, {time}, {guid})
        message: String,
    },

    /// Execute a raw command and print the response
    Exec {
        #[command(flatten)]
        device: DeviceArgs,

        /// Payload encoding
        #[arg(short, long, value_enum, default_value = "text")]
        encoding: PayloadEncoding,

        /// Command text
        payload: String,
    },
}

#[derive(Args)]
struct DeviceArgs {
    /// Port name
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Driver id; the port is scanned when omitted
    #[arg(short, long)]
    driver: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PayloadEncoding {
    Text,
    Hex,
}

impl From<PayloadEncoding> for Encoding {
    fn from(encoding: PayloadEncoding) -> Self {
        match encoding {
            PayloadEncoding::Text => Encoding::Text,
            PayloadEncoding::Hex => Encoding::Hex,
        }
    }
}

/// Everything a subcommand needs
struct Console {
    settings: Settings,
    registry: Arc<DriverRegistry>,
    access: PortAccess,
    virtual_ports: Option<VirtualPorts>,
    trace: bool,
    json: bool,
}

impl Console {
    fn new(cli: &Cli, settings: Settings) -> Self {
        let (access, virtual_ports) = if cli.use_virtual {
            let ports = VirtualPorts::new();
            for entry in &settings.virtual_ports {
                ports.add(entry.port.clone(), VirtualModem::from_config(entry.modem.clone()));
            }
            (virtual_access(&ports), Some(ports))
        } else {
            (PortAccess::serial(), None)
        };

        Self {
            settings,
            registry: Arc::new(DriverRegistry::with_reference_drivers()),
            access,
            virtual_ports,
            trace: cli.trace,
            json: cli.json,
        }
    }

    fn scanner(&self) -> Scanner {
        Scanner::with_config(
            self.registry.clone(),
            self.access.clone(),
            self.settings.scan.clone(),
        )
    }

    fn list_ports(&self) -> Result<Vec<SerialPortInfo>> {
        match &self.virtual_ports {
            Some(ports) => Ok(ports.port_names().into_iter().map(SerialPortInfo::named).collect()),
            None => Ok(PortLister::new().enumerate_ports()?),
        }
    }

    /// Create and open the device described by `args`, scanning for its driver if needed
    async fn open_device(&self, args: &DeviceArgs) -> Result<DeviceSession> {
        let driver = match &args.driver {
            Some(id) => id.clone(),
            None => {
                let scanner = self.scanner();
                let mut rx = self.trace.then(|| scanner.subscribe());
                let found = scanner.scan(&args.port, args.baud).await;
                traffic::flush(&mut rx);
                let found = found.with_context(|| format!("identifying modem on {}", args.port))?;
                info!("Using driver {} for {}", found.identity.id, args.port);
                found.identity.id
            }
        };

        let device = self
            .registry
            .create(&driver, TransportConfig::new(&args.port, args.baud), &self.access)?
            .with_timeouts(self.settings.timeouts.clone());
        let mut session = DeviceSession {
            traffic: self.trace.then(|| device.subscribe()),
            device,
        };

        let opened = session.device.open().await;
        session.flush();
        opened.with_context(|| format!("opening {} on {}", driver, args.port))?;
        Ok(session)
    }
}

/// An open device plus its traffic subscription
struct DeviceSession {
    device: Device,
    traffic: Option<UnboundedReceiver<DeviceEvent>>,
}

impl DeviceSession {
    fn flush(&mut self) {
        traffic::flush(&mut self.traffic);
    }

    async fn close(mut self) {
        self.device.close().await;
        self.flush();
    }
}

/// Port access that opens simulated modems instead of serial ports
fn virtual_access(ports: &VirtualPorts) -> PortAccess {
    let ports = ports.clone();
    PortAccess::new(Arc::new(
        move |config: &TransportConfig| -> Result<DynSerial, ModemError> {
            let stream = ports.open(&config.port).map_err(|e| ModemError::PortUnavailable {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;
            Ok(Box::new(stream))
        },
    ))
}

#[derive(Serialize)]
struct FieldReport {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let console = Console::new(&cli, settings);

    match cli.command {
        Commands::Ports => cmd_ports(&console),
        Commands::Drivers => cmd_drivers(&console),
        Commands::Fields { driver } => cmd_fields(&console, &driver),
        Commands::Scan { port, baud } => cmd_scan(&console, &port, baud).await,
        Commands::Read { device, fields } => cmd_read(&console, &device, &fields).await,
        Commands::Write {
            device,
            field,
            value,
        } => cmd_write(&console, &device, &field, &value).await,
        Commands::Send {
            device,
            destination,
            message,
        } => cmd_send(&console, &device, &destination, &message).await,
        Commands::Exec {
            device,
            encoding,
            payload,
        } => cmd_exec(&console, &device, encoding.into(), &payload).await,
    }
}

fn cmd_ports(console: &Console) -> Result<()> {
    let ports = console.list_ports()?;
    if console.json {
        return print_json(&ports);
    }

    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in &ports {
        let hint = port.hint().unwrap_or_else(|| "unknown".to_string());
        match port.suggested_driver() {
            Some(driver) => println!("{:<24} {} (driver: {})", port.port, hint, driver),
            None => println!("{:<24} {}", port.port, hint),
        }
    }
    Ok(())
}

fn cmd_drivers(console: &Console) -> Result<()> {
    let drivers: Vec<_> = console.registry.drivers().iter().map(|d| d.identity()).collect();
    if console.json {
        return print_json(&drivers);
    }
    for identity in drivers {
        println!("{:<10} {}", identity.id, identity.display_name);
    }
    Ok(())
}

#[derive(Serialize)]
struct FieldInfo {
    name: String,
    readable: bool,
    writable: bool,
}

fn cmd_fields(console: &Console, driver: &str) -> Result<()> {
    let driver = console.registry.driver(driver)?;
    let fields: Vec<FieldInfo> = driver
        .fields
        .iter()
        .map(|f| FieldInfo {
            name: f.name.clone(),
            readable: f.read.is_some(),
            writable: f.write.is_some(),
        })
        .collect();
    if console.json {
        return print_json(&fields);
    }

    println!("{}", driver.display_name);
    for field in &fields {
        let access = match (field.readable, field.writable) {
            (true, true) => "rw",
            (true, false) => "r",
            (false, true) => "w",
            (false, false) => "-",
        };
        println!("  {:<16} {}", field.name, access);
    }
    Ok(())
}

async fn cmd_scan(console: &Console, port: &str, baud: Vec<u32>) -> Result<()> {
    let baud_rates = if baud.is_empty() {
        console.settings.baud_rates.clone()
    } else {
        baud
    };

    let scanner = console.scanner();
    let mut rx = console.trace.then(|| scanner.subscribe());
    let result = scanner.scan_baud_rates(port, &baud_rates).await;
    traffic::flush(&mut rx);
    let found = result.with_context(|| format!("scanning {}", port))?;

    if console.json {
        return print_json(&found);
    }
    println!(
        "{} at {} baud: {} ({})",
        found.port, found.baud_rate, found.identity.display_name, found.identity.id
    );
    Ok(())
}

async fn cmd_read(console: &Console, args: &DeviceArgs, fields: &[String]) -> Result<()> {
    let mut session = console.open_device(args).await?;

    let results = if fields.is_empty() {
        session.device.read_all_fields().await
    } else {
        let mut results = Vec::with_capacity(fields.len());
        for name in fields {
            let value: FieldValue = session
                .device
                .read_field(name)
                .await
                .map_err(|e| FieldError::from(&e));
            results.push((name.clone(), value));
        }
        results
    };
    session.flush();
    session.close().await;

    let reports: Vec<FieldReport> = results
        .into_iter()
        .map(|(name, value)| match value {
            Ok(value) => FieldReport {
                name,
                value: Some(value),
                error: None,
            },
            Err(e) => FieldReport {
                name,
                value: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    if console.json {
        return print_json(&reports);
    }
    for report in &reports {
        match (&report.value, &report.error) {
            (Some(value), _) => println!("{:<16} {}", report.name, value),
            (None, Some(error)) => println!("{:<16} <error: {}>", report.name, error),
            (None, None) => println!("{:<16}", report.name),
        }
    }
    Ok(())
}

async fn cmd_write(console: &Console, args: &DeviceArgs, field: &str, value: &str) -> Result<()> {
    let mut session = console.open_device(args).await?;
    let result = session.device.write_field(field, value).await;
    session.flush();
    session.close().await;

    result.with_context(|| format!("writing {}", field))?;
    println!("{} = {}", field, value);
    Ok(())
}

async fn cmd_send(
    console: &Console,
    args: &DeviceArgs,
    destination: &str,
    message: &str,
) -> Result<()> {
    let mut session = console.open_device(args).await?;
    let result = session.device.send(destination, message).await;
    session.flush();
    session.close().await;

    let receipt = result.with_context(|| format!("sending to {}", destination))?;
    if console.json {
        return print_json(&receipt);
    }
    println!(
        "Sent {} characters ({}), reference {}",
        receipt.content.chars().count(),
        receipt.charset.name(),
        receipt.reference.as_deref().unwrap_or("none")
    );
    Ok(())
}

async fn cmd_exec(
    console: &Console,
    args: &DeviceArgs,
    encoding: Encoding,
    payload: &str,
) -> Result<()> {
    let mut session = console.open_device(args).await?;
    let result = session.device.execute_command(payload, encoding).await;
    session.flush();
    session.close().await;

    let response = result.with_context(|| format!("executing {:?}", payload))?;
    if console.json {
        return print_json(&serde_json::json!({
            "lines": response.lines,
            "final_result": response.final_result.as_ref().map(ToString::to_string),
            "prompt": response.prompt,
        }));
    }
    for line in &response.lines {
        println!("{}", line);
    }
    match &response.final_result {
        Some(result) => println!("{}", result),
        None if response.prompt => println!(">"),
        None => {}
    }
    Ok(())
}
