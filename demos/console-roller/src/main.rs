use critcast::ClientConfig;
use critcast::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::info;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Connect { api_key: String, table_id: String },
    Roll(RollRequest),
    Feed,
    Last,
    Status,
    Clear,
    Disconnect,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  connect <api-key> <table-id>
  roll <notation> <character> [type] [weapon...]
  feed | last | status | clear | disconnect | help | quit";

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".into());
    };

    match verb {
        "connect" => match (words.next(), words.next()) {
            (Some(api_key), Some(table_id)) => Ok(Command::Connect {
                api_key: api_key.into(),
                table_id: table_id.into(),
            }),
            _ => Err("usage: connect <api-key> <table-id>".into()),
        },
        "roll" => {
            let (Some(notation), Some(character)) = (words.next(), words.next()) else {
                return Err("usage: roll <notation> <character> [type] [weapon...]".into());
            };
            let roll_type = words.next().unwrap_or("check");
            let weapon: Vec<&str> = words.collect();
            let mut request = RollRequest::new(notation, character, roll_type);
            if !weapon.is_empty() {
                request = request.with_weapon(weapon.join(" "));
            }
            Ok(Command::Roll(request))
        }
        "feed" => Ok(Command::Feed),
        "last" => Ok(Command::Last),
        "status" => Ok(Command::Status),
        "clear" => Ok(Command::Clear),
        "disconnect" => Ok(Command::Disconnect),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}', try 'help'")),
    }
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::StatusChanged(state) => println!("* status: {state}"),
        ClientEvent::Notice(notice) if notice.is_error() => {
            println!("! {}", notice.message());
        }
        ClientEvent::Notice(notice) => println!("* {}", notice.message()),
        ClientEvent::FeedUpdated { len } => println!("* feed now holds {len} rolls"),
        ClientEvent::MessageReceived(_) => {}
    }
}

/// Runs a connect in the background so the prompt stays usable and
/// `disconnect` can cancel it.
fn spawn_connect(
    handle: ClientHandle,
    credentials: Credentials,
) -> JoinHandle<Result<TableId, CritcastError>> {
    tokio::spawn(async move {
        let result = handle.connect(credentials).await;
        match &result {
            Ok(table) => println!("connected to {table}"),
            Err(e) => println!("connect failed: {e}"),
        }
        result
    })
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    critcast::init_logging();

    let config = ClientConfig::from_env();
    info!(socket = %config.socket_url, server = %config.server_url, "starting console roller");
    let client = TableClient::builder()
        .config(config)
        .app("CritCast Console Roller", env!("CARGO_PKG_VERSION"))
        .build()?;
    let (handle, mut events) = client.into_parts();

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };

        match command {
            Command::Connect { api_key, table_id } => {
                spawn_connect(handle.clone(), Credentials::new(api_key, table_id));
            }
            Command::Roll(request) => match handle.submit_roll(request).await {
                Ok(record) => println!("rolled {record}"),
                Err(e) if e.is_input_error() => println!("{e} (see 'help')"),
                Err(e) => println!("roll failed: {e}"),
            },
            Command::Feed => {
                let snapshot = handle.snapshot().await?;
                if snapshot.feed.is_empty() {
                    println!("(no rolls yet)");
                }
                for record in &snapshot.feed {
                    let who = record.context.character.as_deref().unwrap_or("?");
                    println!("  {who}: {record}");
                }
            }
            Command::Last => {
                let snapshot = handle.snapshot().await?;
                match snapshot.last_message.render() {
                    Some(text) => println!("{text}"),
                    None => println!("(nothing received)"),
                }
            }
            Command::Status => {
                let snapshot = handle.snapshot().await?;
                match snapshot.last_message.received_at() {
                    Some(at) => println!("{} (last message {})", snapshot.state, at.format("%H:%M:%S")),
                    None => println!("{}", snapshot.state),
                }
            }
            Command::Clear => handle.clear_feed().await?,
            Command::Disconnect => {
                if !handle.disconnect().await? {
                    println!("not connected");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    handle.shutdown().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connect() {
        assert_eq!(
            parse_command("connect key-1 table-9").unwrap(),
            Command::Connect {
                api_key: "key-1".into(),
                table_id: "table-9".into(),
            }
        );
        assert!(parse_command("connect key-only").is_err());
    }

    #[test]
    fn test_parse_roll_with_weapon() {
        let Command::Roll(request) = parse_command("roll 1d20+5 Vex attack Flame Tongue").unwrap()
        else {
            panic!("expected roll");
        };
        assert_eq!(request.notation, "1d20+5");
        assert_eq!(request.character, "Vex");
        assert_eq!(request.roll_type, "attack");
        assert_eq!(request.weapon.as_deref(), Some("Flame Tongue"));
    }

    #[test]
    fn test_parse_roll_defaults_type() {
        let Command::Roll(request) = parse_command("roll 2d6 Vex").unwrap() else {
            panic!("expected roll");
        };
        assert_eq!(request.roll_type, "check");
        assert_eq!(request.weapon, None);
    }

    #[tokio::test]
    async fn test_pending_connect_can_be_cancelled_from_the_prompt() {
        // Accepts TCP but never answers the upgrade, so the connect hangs.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TableClient::builder()
            .socket_url(&format!("ws://{}", listener.local_addr().unwrap()))
            .build()
            .unwrap();
        let handle = client.handle();

        let pending = spawn_connect(handle.clone(), Credentials::new("key-1", "table-1"));
        loop {
            match client.next_event().await {
                Some(ClientEvent::StatusChanged(SessionState::Connecting)) => break,
                Some(_) => {}
                None => panic!("client stopped"),
            }
        }

        assert!(handle.disconnect().await.unwrap());
        assert!(matches!(pending.await.unwrap(), Err(CritcastError::Cancelled)));
    }

    #[test]
    fn test_parse_unknown_is_error() {
        assert!(parse_command("fireball").unwrap_err().contains("unknown command"));
        assert!(parse_command("   ").is_err());
    }
}
