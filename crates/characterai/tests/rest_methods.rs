//! REST method tests against a scripted local HTTP server.

use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use characterai::{Client, Error};

/// Boots a one-response-per-connection HTTP stub. Each accepted connection
/// reads one full request, records it, and answers with the next scripted
/// JSON body. Returns the base URL and the recorded requests.
async fn stub_server(responses: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded = Arc::new(Mutex::new(Vec::new()));

    let record = Arc::clone(&recorded);
    tokio::spawn(async move {
        for body in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let request = read_request(&mut socket).await;
            record.lock().unwrap().push(request);
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    (format!("http://{addr}"), recorded)
}

/// Reads one request: head up to the blank line, then `content-length`
/// bytes of body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    while !raw.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(n) if n > 0 => raw.extend_from_slice(&byte[..n]),
            _ => return String::from_utf8_lossy(&raw).into_owned(),
        }
    }
    let head = String::from_utf8_lossy(&raw).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        let _ = socket.read_exact(&mut body).await;
    }
    head + &String::from_utf8_lossy(&body)
}

fn test_client(plus_base: &str) -> Client {
    Client::builder("tok1").plus_base(plus_base).build().unwrap()
}

#[tokio::test]
async fn voice_override_hits_update_and_delete_endpoints() {
    let (base, recorded) = stub_server(vec![
        r#"{"success": true}"#.to_string(),
        r#"{"success": true}"#.to_string(),
    ])
    .await;
    let client = test_client(&base);

    client.voices().set_voice("char1", "voice1").await.unwrap();
    client.voices().unset_voice("char1").await.unwrap();

    let recorded = recorded.lock().unwrap();
    assert!(recorded[0].starts_with("POST /chat/character/char1/voice_override/update/"));
    assert!(recorded[0].contains(r#""voice_id":"voice1""#));
    assert!(recorded[0].to_lowercase().contains("authorization: token tok1"));
    assert!(recorded[1].starts_with("POST /chat/character/char1/voice_override/delete/"));
}

#[tokio::test]
async fn voice_override_failure_maps_to_set_error() {
    let (base, _recorded) = stub_server(vec![r#"{"success": false}"#.to_string()]).await;
    let client = test_client(&base);

    let err = client
        .voices()
        .set_voice("char1", "voice1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Set(_)));
}

#[tokio::test]
async fn unset_persona_override_clears_the_character_entry() {
    let settings = json!({
        "default_persona_id": "p1",
        "personaOverrides": {"char1": "p1", "char2": "p2"},
    });
    let (base, recorded) = stub_server(vec![
        settings.to_string(),
        r#"{"success": true, "settings": {}}"#.to_string(),
    ])
    .await;
    let client = test_client(&base);

    client
        .account()
        .unset_persona_override("char1")
        .await
        .unwrap();

    let recorded = recorded.lock().unwrap();
    assert!(recorded[0].starts_with("GET /chat/user/settings/"));
    // The full settings object goes back with the one entry blanked.
    assert!(recorded[1].starts_with("POST /chat/user/update_settings/"));
    assert!(recorded[1].contains(r#""char1":"""#));
    assert!(recorded[1].contains(r#""char2":"p2""#));
}

#[tokio::test]
async fn set_persona_override_writes_the_character_entry() {
    let (base, recorded) = stub_server(vec![
        r#"{"default_persona_id": "", "personaOverrides": {}}"#.to_string(),
        r#"{"success": true, "settings": {}}"#.to_string(),
    ])
    .await;
    let client = test_client(&base);

    client
        .account()
        .set_persona_override("char1", "p9")
        .await
        .unwrap();

    let recorded = recorded.lock().unwrap();
    assert!(recorded[1].contains(r#""char1":"p9""#));
}
