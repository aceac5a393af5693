use std::env;
use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;

use dotenvy::dotenv;

use crate::types::{ConnectionKind, SessionConfig};
use crate::DEBUG_PARSE;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    pub session: SessionConfig,
}

pub fn get_config() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    match args.as_slice() {
        // Case 1: useEnv
        [_, mode] if mode == "useEnv" => {
            dotenv()?; // ← читаем .env
            let listen = env::var("SSTPD_LISTEN").unwrap_or_else(|_| "0.0.0.0:443".into());
            let connection_kind = match env::var("SSTPD_CONNECTION").as_deref() {
                Ok("native") => ConnectionKind::Native,
                Ok("pppd") | Err(_) => ConnectionKind::Pppd,
                Ok(other) => {
                    return Err(format!("Unknown SSTPD_CONNECTION '{other}' (expected 'native' or 'pppd')").into())
                }
            };
            let pppd_args = env::var("SSTPD_PPPD_ARGS")
                .map(|s| s.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default();
            let src_ip = parse_ip_var("SSTPD_SRC_IP")?;
            let dst_ip = parse_ip_var("SSTPD_DST_IP")?;
            if env::var("SSTPD_DEBUG_PARSE").is_ok() {
                DEBUG_PARSE.store(true, Ordering::Relaxed);
            }
            Ok(ServerConfig {
                listen,
                session: SessionConfig {
                    connection_kind,
                    pppd_args,
                    src_ip,
                    dst_ip,
                },
            })
        }

        // Case 2: useInline listen [pppd args...]
        [_, mode, listen, pppd_args @ ..] if mode == "useInline" => Ok(ServerConfig {
            listen: listen.clone(),
            session: SessionConfig {
                pppd_args: pppd_args.to_vec(),
                ..SessionConfig::default()
            },
        }),

        // Anything else
        _ => Err("Please either use 'useEnv' with environment variables or 'useInline <listen addr> [pppd args...]'".into()),
    }
}

fn parse_ip_var(name: &str) -> Result<Option<Ipv4Addr>, Box<dyn std::error::Error>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value.parse::<Ipv4Addr>()?)),
        Err(_) => Ok(None),
    }
}
