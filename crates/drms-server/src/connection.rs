//! Per-connection request loop (spec §4.6 steps 1-4, §6 wire protocol):
//! reads one `RequestFrame` at a time, writes the `rinfo` ack immediately,
//! then the reply payload — exactly the contract `Dispatcher::dispatch`'s
//! own doc comment describes. Grounded on
//! `connector_proxy::connector_runners::commandutils::handle_stream`'s
//! read-frame/dispatch/write-frame loop in the teacher, adapted from sync
//! I/O to `tokio::net::TcpStream`.

use drms_proto::{decode_kv_list, encode_kv_list, read_request, write_request, write_rinfo, Capabilities, HelloReply, Opcode, RINFO_SUCCESS};
use drms_sumsd::Dispatcher;
use drms_types::value::Value;
use tokio::net::TcpStream;

use crate::config::ServerConfig;

fn uid_of(args: &[(String, Value)]) -> i64 {
    args.iter()
        .find(|(k, _)| k == "uid")
        .and_then(|(_, v)| if let Value::Long(n) = v { Some(*n) } else { None })
        .unwrap_or(0)
}

fn str_arg(args: &[(String, Value)], key: &str) -> Option<String> {
    args.iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| if let Value::String(b) = v { Some(String::from_utf8_lossy(b).into_owned()) } else { None })
}

/// Drives one client connection until it disconnects or the socket errs
/// out. `open_channel` builds a fresh `SqlChannel` for each `OPEN` call
/// (one Postgres-backed connection per session, per spec §4.3).
pub async fn handle_connection<C, F>(
    mut stream: TcpStream,
    dispatcher: &Dispatcher<C>,
    config: &ServerConfig,
    open_channel: F,
) where
    C: drms_client::SqlChannel,
    F: Fn() -> C,
{
    loop {
        let frame = match read_request(&mut stream).await {
            Ok(frame) => frame,
            Err(drms_proto::ProtoError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request frame; closing connection");
                return;
            }
        };

        let args = match decode_kv_list(&frame.args) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(error = %e, "malformed argument list; closing connection");
                return;
            }
        };

        match frame.opcode {
            Opcode::Hello => {
                let reply = HelloReply {
                    server_version: config.server_version.clone(),
                    accepted: Capabilities::OFFLINE_READ | Capabilities::LINK_FOLLOW_ALL,
                };
                let reply_kv = vec![
                    ("server_version".to_string(), Value::String(reply.server_version.into_bytes())),
                    ("accepted".to_string(), Value::Int(reply.accepted.bits() as i32)),
                ];
                if write_rinfo(&mut stream, RINFO_SUCCESS).await.is_err() {
                    return;
                }
                if write_request(&mut stream, Opcode::Hello, &encode_kv_list(&reply_kv)).await.is_err() {
                    return;
                }
            }
            Opcode::Open => {
                let uid = uid_of(&args);
                let namespace = str_arg(&args, "namespace").unwrap_or_else(|| config.default_namespace.clone());
                let channel = open_channel();
                let rinfo = match dispatcher.open(uid, &namespace, channel).await {
                    Ok(()) => RINFO_SUCCESS,
                    Err(e) => {
                        tracing::warn!(uid, error = %e, "OPEN rejected");
                        drms_types::DrmsError::InvalidData(e.to_string()).rinfo()
                    }
                };
                if write_rinfo(&mut stream, rinfo).await.is_err() {
                    return;
                }
                if write_request(&mut stream, Opcode::Open, &encode_kv_list(&[])).await.is_err() {
                    return;
                }
            }
            opcode => {
                let uid = uid_of(&args);
                let is_disconnect = opcode == Opcode::Disconnect;
                let (rinfo, reply) = dispatcher.dispatch(uid, opcode, args).await;
                if write_rinfo(&mut stream, rinfo).await.is_err() {
                    return;
                }
                if write_request(&mut stream, opcode, &encode_kv_list(&reply)).await.is_err() {
                    return;
                }
                if is_disconnect {
                    return;
                }
            }
        }
    }
}
