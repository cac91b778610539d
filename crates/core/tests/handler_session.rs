//! Handler state machine tests against a scripted wire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use trawler_core::config::IrcConfig;
use trawler_core::domain::{IrcChannel, IrcNetwork, NickServ};
use trawler_core::indexer::{
    IndexerDefinition, IndexerIrc, MatchRules, ParseLine, ParseRules, ParseType,
};
use trawler_core::irc::{Handler, SessionState};
use trawler_core::testing::{CollectingSink, MockConnector, MockWireHandle};

const WAIT: Duration = Duration::from_secs(2);

fn test_config() -> IrcConfig {
    IrcConfig {
        reconnect_initial_secs: 0,
        reconnect_max_secs: 1,
        nickserv_timeout_secs: 1,
        nickserv_attempts: 2,
    }
}

fn network(channels: &[&str]) -> IrcNetwork {
    IrcNetwork {
        id: 1,
        name: "TestNet".to_string(),
        enabled: true,
        server: "irc.test.org".to_string(),
        port: 6697,
        tls: true,
        nickserv: NickServ {
            account: "trawlerbot".to_string(),
            password: None,
        },
        channels: channels
            .iter()
            .map(|name| IrcChannel {
                name: name.to_string(),
                enabled: true,
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn definition() -> Arc<IndexerDefinition> {
    Arc::new(IndexerDefinition {
        identifier: "testtracker".to_string(),
        name: "Test Tracker".to_string(),
        irc: IndexerIrc {
            network: "TestNet".to_string(),
            server: "irc.test.org".to_string(),
            port: 6697,
            tls: true,
            channels: vec!["#announce".to_string()],
            announcers: vec!["TrackerBot".to_string()],
            settings: vec![],
        },
        parse: ParseRules {
            parse_type: ParseType::Single,
            multi_key: vec![],
            lines: vec![ParseLine {
                pattern: r"^NEW :: (.+?) :: (https?://\S+)$".to_string(),
                vars: vec!["torrentName".to_string(), "baseUrl".to_string()],
                mappings: None,
            }],
        },
        match_rules: MatchRules {
            torrent_url: "{{ .baseUrl }}".to_string(),
        },
        settings: HashMap::new(),
    })
}

struct Session {
    handler: Arc<Handler>,
    sink: Arc<CollectingSink>,
    wire: MockWireHandle,
}

fn start(network: IrcNetwork) -> Session {
    let sink = Arc::new(CollectingSink::new());
    let connector = Arc::new(MockConnector::new());
    let wire = connector.script_session();

    let handler = Arc::new(Handler::new(
        network,
        vec![definition()],
        sink.clone(),
        connector.clone(),
        test_config(),
    ));

    let run_handler = handler.clone();
    tokio::spawn(async move {
        let _ = run_handler.run().await;
    });

    Session { handler, sink, wire }
}

/// Drive the scripted session through registration and all joins.
async fn bring_active(session: &Session, channels: &[&str]) {
    session
        .wire
        .wait_for_sent(|l| l.starts_with("USER "), WAIT)
        .await
        .expect("registration sent");
    session.wire.push_line(":irc.test.org 001 trawlerbot :Welcome");

    for channel in channels {
        session
            .wire
            .wait_for_sent(|l| l == format!("JOIN {}", channel), WAIT)
            .await
            .expect("join sent");
        session
            .wire
            .push_line(&format!(":trawlerbot!t@host JOIN {}", channel));
    }
}

#[tokio::test]
async fn test_registration_sequence() {
    let session = start(network(&["#announce"]));

    let sent = session
        .wire
        .wait_for_sent(|l| l.starts_with("USER "), WAIT)
        .await;
    assert!(sent.is_some());

    let lines = session.wire.sent_lines();
    assert_eq!(lines[0], "NICK trawlerbot");
    assert!(lines[1].starts_with("USER trawlerbot"));
}

#[tokio::test]
async fn test_server_password_sent_first() {
    let mut net = network(&["#announce"]);
    net.pass = Some("serverpass".to_string());
    let session = start(net);

    session
        .wire
        .wait_for_sent(|l| l.starts_with("USER "), WAIT)
        .await
        .expect("registration sent");

    let lines = session.wire.sent_lines();
    assert_eq!(lines[0], "PASS serverpass");
    assert_eq!(lines[1], "NICK trawlerbot");
}

#[tokio::test]
async fn test_welcome_marks_connected_and_joins() {
    let session = start(network(&["#announce", "#backup"]));
    assert!(!session.handler.connected());

    bring_active(&session, &["#announce", "#backup"]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(session.handler.connected());
    assert_eq!(session.handler.session_state(), SessionState::Active);

    let health = session.handler.health_snapshot();
    assert!(health.get("#announce").unwrap().monitoring);
    assert!(health.get("#backup").unwrap().monitoring);
}

#[tokio::test]
async fn test_ping_answered_with_pong() {
    let session = start(network(&["#announce"]));
    session
        .wire
        .wait_for_sent(|l| l.starts_with("USER "), WAIT)
        .await
        .expect("registration sent");

    session.wire.push_line("PING :token-123");
    let pong = session
        .wire
        .wait_for_sent(|l| l.starts_with("PONG"), WAIT)
        .await;
    assert_eq!(pong.as_deref(), Some("PONG token-123"));
}

#[tokio::test]
async fn test_nickserv_identify_flow() {
    let mut net = network(&["#announce"]);
    net.nickserv.password = Some("secret".to_string());
    let session = start(net);

    session
        .wire
        .wait_for_sent(|l| l.starts_with("USER "), WAIT)
        .await
        .expect("registration sent");
    session.wire.push_line(":irc.test.org 001 trawlerbot :Welcome");

    let identify = session
        .wire
        .wait_for_sent(|l| l.contains("IDENTIFY"), WAIT)
        .await;
    assert_eq!(
        identify.as_deref(),
        Some("PRIVMSG NickServ :IDENTIFY trawlerbot secret")
    );

    // No joins until NickServ confirms.
    assert!(session
        .wire
        .sent_lines()
        .iter()
        .all(|l| !l.starts_with("JOIN")));

    session
        .wire
        .push_line(":NickServ!s@services NOTICE trawlerbot :Password accepted - you are now identified");

    let join = session
        .wire
        .wait_for_sent(|l| l.starts_with("JOIN"), WAIT)
        .await;
    assert_eq!(join.as_deref(), Some("JOIN #announce"));
}

#[tokio::test]
async fn test_channel_password_in_join() {
    let mut net = network(&[]);
    net.channels.push(IrcChannel {
        name: "#secret".to_string(),
        enabled: true,
        password: Some("chanpass".to_string()),
        ..Default::default()
    });
    let session = start(net);

    session
        .wire
        .wait_for_sent(|l| l.starts_with("USER "), WAIT)
        .await
        .expect("registration sent");
    session.wire.push_line(":irc.test.org 001 trawlerbot :Welcome");

    let join = session
        .wire
        .wait_for_sent(|l| l.starts_with("JOIN"), WAIT)
        .await;
    assert_eq!(join.as_deref(), Some("JOIN #secret chanpass"));
}

#[tokio::test]
async fn test_disabled_channel_not_joined() {
    let mut net = network(&["#announce"]);
    net.channels.push(IrcChannel {
        name: "#disabled".to_string(),
        enabled: false,
        ..Default::default()
    });
    let session = start(net);

    bring_active(&session, &["#announce"]).await;

    assert!(session
        .wire
        .sent_lines()
        .iter()
        .all(|l| !l.contains("#disabled")));
}

#[tokio::test]
async fn test_announcer_line_produces_release() {
    let session = start(network(&["#announce"]));
    bring_active(&session, &["#announce"]).await;

    session.wire.push_line(
        ":TrackerBot!b@tracker PRIVMSG #announce :NEW :: Some.Release.2024 :: https://t.example/dl/9",
    );

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if !session.sink.delivered().is_empty() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "no release delivered");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let releases = session.sink.delivered();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].torrent_name, "Some.Release.2024");
    assert_eq!(releases[0].download_url, "https://t.example/dl/9");

    let health = session.handler.health_snapshot();
    assert!(health.get("#announce").unwrap().last_announce.is_some());
}

#[tokio::test]
async fn test_non_announcer_lines_dropped() {
    let session = start(network(&["#announce"]));
    bring_active(&session, &["#announce"]).await;

    session.wire.push_line(
        ":RandomUser!u@host PRIVMSG #announce :NEW :: Some.Release.2024 :: https://t.example/dl/9",
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(session.sink.delivered().is_empty());
    // Not a parse attempt either.
    let health = session.handler.health_snapshot();
    assert!(health.get("#announce").unwrap().last_announce.is_none());
}

#[tokio::test]
async fn test_detached_channel_is_muted() {
    let mut net = network(&[]);
    net.channels.push(IrcChannel {
        name: "#announce".to_string(),
        enabled: true,
        detached: true,
        ..Default::default()
    });
    let session = start(net);
    bring_active(&session, &["#announce"]).await;

    session.wire.push_line(
        ":TrackerBot!b@tracker PRIVMSG #announce :NEW :: Some.Release.2024 :: https://t.example/dl/9",
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(session.sink.delivered().is_empty());
}

#[tokio::test]
async fn test_invite_triggers_join_of_configured_channel() {
    let session = start(network(&["#announce"]));
    bring_active(&session, &["#announce"]).await;
    session.wire.clear_sent();

    // Invites to unknown channels are ignored.
    session
        .wire
        .push_line(":SomeBot!b@h INVITE trawlerbot :#elsewhere");
    // Invite to a configured channel (e.g. after a netsplit) joins again.
    session
        .wire
        .push_line(":SomeBot!b@h INVITE trawlerbot :#announce");

    let join = session
        .wire
        .wait_for_sent(|l| l.starts_with("JOIN"), WAIT)
        .await;
    assert_eq!(join.as_deref(), Some("JOIN #announce"));
    assert!(session
        .wire
        .sent_lines()
        .iter()
        .all(|l| !l.contains("#elsewhere")));
}

#[tokio::test]
async fn test_nick_in_use_appends_underscore() {
    let session = start(network(&["#announce"]));
    session
        .wire
        .wait_for_sent(|l| l.starts_with("USER "), WAIT)
        .await
        .expect("registration sent");

    session
        .wire
        .push_line(":irc.test.org 433 * trawlerbot :Nickname is already in use");

    let retry = session
        .wire
        .wait_for_sent(|l| l == "NICK trawlerbot_", WAIT)
        .await;
    assert!(retry.is_some());
}

#[tokio::test]
async fn test_transport_error_reconnects() {
    let sink = Arc::new(CollectingSink::new());
    let connector = Arc::new(MockConnector::new());
    let first = connector.script_session();
    let second = connector.script_session();

    let handler = Arc::new(Handler::new(
        network(&["#announce"]),
        vec![definition()],
        sink,
        connector.clone(),
        test_config(),
    ));
    let run_handler = handler.clone();
    tokio::spawn(async move {
        let _ = run_handler.run().await;
    });

    first
        .wait_for_sent(|l| l.starts_with("USER "), WAIT)
        .await
        .expect("first registration");
    first.push_line(":irc.test.org 001 trawlerbot :Welcome");
    first
        .wait_for_sent(|l| l.starts_with("JOIN"), WAIT)
        .await
        .expect("first join");
    assert!(handler.connected());

    first.disconnect();

    // Second scripted session is connected after backoff and re-registered.
    second
        .wait_for_sent(|l| l.starts_with("NICK "), WAIT)
        .await
        .expect("reconnect registration");
    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_terminal() {
    let session = start(network(&["#announce"]));
    bring_active(&session, &["#announce"]).await;

    session.handler.stop();
    session.handler.stop();

    let deadline = tokio::time::Instant::now() + WAIT;
    while session.handler.session_state() != SessionState::Terminated {
        assert!(tokio::time::Instant::now() < deadline, "never terminated");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!session.handler.connected());
}

#[tokio::test]
async fn test_restart_uses_updated_snapshot() {
    let sink = Arc::new(CollectingSink::new());
    let connector = Arc::new(MockConnector::new());
    let first = connector.script_session();
    let second = connector.script_session();

    let handler = Arc::new(Handler::new(
        network(&["#announce"]),
        vec![definition()],
        sink,
        connector.clone(),
        test_config(),
    ));
    let run_handler = handler.clone();
    tokio::spawn(async move {
        let _ = run_handler.run().await;
    });

    first
        .wait_for_sent(|l| l.starts_with("USER "), WAIT)
        .await
        .expect("first registration");
    first.push_line(":irc.test.org 001 trawlerbot :Welcome");
    first
        .wait_for_sent(|l| l.starts_with("JOIN"), WAIT)
        .await
        .expect("first join");
    first.push_line(":trawlerbot!t@host JOIN #announce");

    let mut updated = network(&["#announce"]);
    updated.port = 7000;
    handler.update_network(updated);
    handler.restart();

    second
        .wait_for_sent(|l| l.starts_with("NICK "), WAIT)
        .await
        .expect("reconnect registration");
    assert_eq!(
        connector.last_target(),
        Some(("irc.test.org".to_string(), 7000, true))
    );

    // Health entries were reset by the reconnect.
    let health = handler.health_snapshot();
    assert!(!health.get("#announce").unwrap().monitoring);
}
