mod cli;
mod logging;
mod report;

use std::process::ExitCode;

use cli::{CommandLine, ListArgs, Request};
use usbrelay_core::prelude::*;
use usbrelay_core::protocol::filter_candidates;

fn main() -> ExitCode {
    let commands = CommandLine::parse_args();

    logging::init_cli_logger(commands.debug, commands.verbose);
    tracing::debug!("{:?}", commands);

    match run(&commands) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ExitCode::from(exit_status(&e))
        }
    }
}

/// 3 when a relay may still be energized, 2 for arguments rejected before any I/O, 1 otherwise
fn exit_status(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<RelayError>() {
        Some(err) if err.may_leave_relay_on() => 3,
        Some(err) if err.is_validation() => 2,
        _ => 1,
    }
}

fn run(commands: &CommandLine) -> anyhow::Result<ExitCode> {
    // Validate everything before any port is enumerated or opened
    match commands.request()? {
        Request::ListPorts(args) => list(&args),
        Request::Set { target, state } => {
            let (mut controller, port) = connect(commands)?;
            let reply = controller.apply(target, state)?;
            println!("{}", report::apply_line(&reply, &port));
            Ok(ExitCode::SUCCESS)
        }
        Request::Status { target, raw } => {
            let (mut controller, _) = connect(commands)?;
            let status = controller.query_status(target)?;
            if raw {
                println!("{}", report::raw_line(&status.raw));
            }
            if !status.is_decoded() {
                eprintln!("Unable to decode status. Raw hex: {}", status.raw_hex());
                return Ok(ExitCode::FAILURE);
            }
            println!("{}", status);
            Ok(ExitCode::SUCCESS)
        }
        Request::Raw { bytes, raw } => {
            let (mut controller, _) = connect(commands)?;
            let response = controller.send_raw(&bytes)?;
            println!("{}", report::raw_response(&response, raw));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Resolve the port and open a controller on it
fn connect(commands: &CommandLine) -> anyhow::Result<(RelayController<Session>, String)> {
    let ports = list_ports();
    let port = resolve_port(commands.port.as_deref(), &ports)?;
    let session = Session::open(&commands.session_config(&port.path)?)?;
    Ok((
        RelayController::new(session, commands.controller_config()?),
        port.path,
    ))
}

fn list(args: &ListArgs) -> anyhow::Result<ExitCode> {
    let mut ports = list_ports();
    if args.relay_only {
        ports = filter_candidates(&ports);
    }

    let output = if args.csv {
        report::ports_csv(&ports)?
    } else if args.json {
        report::ports_json(&ports)?
    } else if args.detailed {
        report::ports_table(&ports)
    } else {
        report::ports_plain(&ports)
    };

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_exit_status() {
        let validation = anyhow::Error::from(RelayError::InvalidRelay(9));
        assert_eq!(exit_status(&validation), 2);

        let partial = anyhow::Error::from(RelayError::PulsePartialFailure {
            target: RelayTarget::Single(1),
            source: Box::new(RelayError::Write(io::Error::other("unplugged"))),
        });
        assert_eq!(exit_status(&partial), 3);

        let connect = anyhow::Error::from(RelayError::Connect {
            port: "COM3".to_string(),
            source: serialport::Error::new(serialport::ErrorKind::NoDevice, "gone"),
        });
        assert_eq!(exit_status(&connect), 1);

        let interrupted = anyhow::Error::from(RelayError::PulseOnFailed {
            target: RelayTarget::All,
            source: Box::new(RelayError::SwitchInterrupted {
                target: RelayTarget::All,
                operation: Operation::On,
                failed: RelayTarget::Single(3),
                sent: 3,
                source: Box::new(RelayError::Write(io::Error::other("unplugged"))),
            }),
        });
        assert_eq!(exit_status(&interrupted), 3);

        assert_eq!(exit_status(&anyhow::anyhow!("csv output")), 1);
    }
}
