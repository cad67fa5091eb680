//! Headless bridge console
//!
//! Connects the remapping engine between a chosen pair of MIDI ports and
//! drives it from a small command prompt: list switches, add/delete, change
//! modes, learn mappings, save the configuration. Engine activity is printed
//! as it happens by a background consumer thread.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};

use ccbridge_engine::{
    default_config_path, list_input_ports, list_output_ports, load_config, save_config,
    BridgeSession, EngineEvent, LearnSlot, RegistryLimits, SwitchId, SwitchMode,
};

struct CliArgs {
    input: Option<String>,
    output: Option<String>,
    config: Option<PathBuf>,
    list: bool,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = CliArgs {
        input: None,
        output: None,
        config: None,
        list: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--in" => args.input = Some(iter.next().context("--in needs a port name")?),
            "--out" => args.output = Some(iter.next().context("--out needs a port name")?),
            "--config" => {
                args.config = Some(PathBuf::from(
                    iter.next().context("--config needs a file path")?,
                ))
            }
            "--list" => args.list = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

fn print_usage() {
    println!("ccbridge: MIDI footswitch CC bridge");
    println!();
    println!("USAGE: ccbridge [--in PORT] [--out PORT] [--config FILE] [--list]");
    println!();
    println!("  --in PORT      input port name (exact or substring match)");
    println!("  --out PORT     output port name");
    println!("  --config FILE  configuration file (default: user config dir)");
    println!("  --list         list available MIDI ports and exit");
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;

    let inputs = list_input_ports()?;
    let outputs = list_output_ports()?;

    if args.list {
        print_ports("input", &inputs);
        print_ports("output", &outputs);
        return Ok(());
    }

    if inputs.is_empty() {
        bail!("no MIDI input ports available");
    }
    if outputs.is_empty() {
        bail!("no MIDI output ports available");
    }

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = load_config(&config_path);

    let input_name = pick_port("input", args.input, config.input_port.clone(), &inputs)?;
    let output_name = pick_port("output", args.output, config.output_port.clone(), &outputs)?;

    let mut session = BridgeSession::with_config(config, RegistryLimits::default());
    session.connect(&input_name, &output_name)?;

    // Dedicated consumer: prints engine activity while the prompt blocks on
    // stdin. Ends when the session (and with it the channel) is dropped.
    let events = session.events();
    let printer = std::thread::spawn(move || {
        for event in events.iter() {
            print_event(&event);
        }
    });

    println!("Bridge ready. Type 'help' for commands, 'quit' to exit.");
    command_loop(&session, &config_path)?;

    session.disconnect();
    drop(session);
    let _ = printer.join();
    println!("Goodbye.");
    Ok(())
}

fn print_ports(kind: &str, ports: &[String]) {
    println!("Available {kind} ports:");
    if ports.is_empty() {
        println!("  (none)");
    }
    for (i, port) in ports.iter().enumerate() {
        println!("  {}. {}", i + 1, port);
    }
}

/// Resolve a port name: command line first, then the saved config, then an
/// interactive numbered prompt.
fn pick_port(
    kind: &str,
    from_args: Option<String>,
    from_config: Option<String>,
    ports: &[String],
) -> anyhow::Result<String> {
    if let Some(name) = from_args {
        return Ok(name);
    }
    if let Some(name) = from_config {
        log::info!("using saved {kind} port: {name}");
        return Ok(name);
    }

    print_ports(kind, ports);
    print!("\nSelect the {kind} port number: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let index: usize = line
        .trim()
        .parse()
        .context("port selection must be a number")?;
    index
        .checked_sub(1)
        .and_then(|i| ports.get(i))
        .cloned()
        .context("selection out of range")
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::CcReceived { cc, value } => log::info!("MIDI IN: CC{cc} = {value}"),
        EngineEvent::MappingLearned { id, slot, cc } => {
            let slot = match slot {
                LearnSlot::Input => "input",
                LearnSlot::Output => "output",
            };
            log::info!("switch {id}: {slot} mapping set to CC{cc}");
        }
        EngineEvent::SwitchStateChanged {
            id,
            state,
            output_cc,
        } => {
            let state = if *state { "ON" } else { "OFF" };
            log::info!("switch {id} -> {state} (CC{output_cc})");
        }
        EngineEvent::UnmappedCc { cc } => log::info!("CC{cc} is not mapped to any switch"),
        EngineEvent::SendFailed { cc, reason } => log::warn!("send CC{cc} failed: {reason}"),
        EngineEvent::Disconnected => log::info!("ports disconnected"),
    }
}

fn command_loop(session: &BridgeSession, config_path: &std::path::Path) -> anyhow::Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let result = match command {
            "help" => {
                print_help();
                Ok(())
            }
            "list" => {
                print_switches(session);
                Ok(())
            }
            "add" => session.create_switch().map(|id| {
                println!("added switch {id}");
            }),
            "del" => with_id(words.next(), |id| session.delete_switch(id)),
            "mode" => match (words.next(), words.next()) {
                (Some(id), Some(mode)) => {
                    let mode = match mode {
                        "toggle" => SwitchMode::Toggle,
                        "momentary" => SwitchMode::Momentary,
                        other => {
                            println!("unknown mode '{other}' (toggle|momentary)");
                            continue;
                        }
                    };
                    with_id(Some(id), |id| session.set_mode(id, mode))
                }
                _ => {
                    println!("usage: mode <id> toggle|momentary");
                    Ok(())
                }
            },
            "out" => match (words.next(), words.next().and_then(|v| v.parse::<u8>().ok())) {
                (Some(id), Some(cc)) => with_id(Some(id), |id| session.set_output_cc(id, cc)),
                _ => {
                    println!("usage: out <id> <cc>");
                    Ok(())
                }
            },
            "learn" => with_id(words.next(), |id| {
                session.start_learn_input(id).map(|()| {
                    println!("press the pedal to assign its input CC...");
                })
            }),
            "learnout" => with_id(words.next(), |id| {
                session.start_learn_output(id).map(|()| {
                    println!("press the pedal to assign the output CC...");
                })
            }),
            "cancel" => {
                session.cancel_learn();
                Ok(())
            }
            "save" => {
                let config = session.snapshot_config();
                match save_config(&config, config_path) {
                    Ok(()) => println!("saved to {}", config_path.display()),
                    Err(e) => println!("save failed: {e:#}"),
                }
                Ok(())
            }
            "quit" | "exit" => return Ok(()),
            other => {
                println!("unknown command '{other}' (try 'help')");
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("error: {e}");
        }
    }
    Ok(())
}

fn with_id(
    word: Option<&str>,
    f: impl FnOnce(SwitchId) -> Result<(), ccbridge_engine::EngineError>,
) -> Result<(), ccbridge_engine::EngineError> {
    match word.and_then(|w| w.parse::<u32>().ok()) {
        Some(raw) => f(SwitchId::new(raw)),
        None => {
            println!("expected a numeric switch id");
            Ok(())
        }
    }
}

fn print_help() {
    println!("commands:");
    println!("  list               show all switches");
    println!("  add                add a switch");
    println!("  del <id>           delete a switch");
    println!("  mode <id> <mode>   set toggle|momentary");
    println!("  out <id> <cc>      set the output CC");
    println!("  learn <id>         capture the next CC as input mapping");
    println!("  learnout <id>      capture the next CC as output mapping");
    println!("  cancel             cancel a pending capture");
    println!("  save               write the configuration");
    println!("  quit               disconnect and exit");
}

fn print_switches(session: &BridgeSession) {
    println!("  id  input   output  mode       state");
    for switch in session.switches() {
        let input = switch
            .input_cc
            .map(|cc| format!("CC{cc}"))
            .unwrap_or_else(|| "--".to_string());
        let mode = match switch.mode {
            SwitchMode::Toggle => "toggle",
            SwitchMode::Momentary => "momentary",
        };
        let state = if switch.state { "ON" } else { "off" };
        let lock = if switch.protected { "*" } else { " " };
        println!(
            "  {}{:<3} {:<7} CC{:<5} {:<10} {}",
            lock,
            switch.id.raw(),
            input,
            switch.output_cc,
            mode,
            state
        );
    }
}
