//! nginx config rendering.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

/// Everything needed to render and reload the proxy config.
#[derive(Debug, Clone)]
pub struct NginxSettings {
    pub config_path: PathBuf,
    /// Program and arguments. Empty disables the reload step.
    pub reload_command: Vec<String>,
    pub listen_port: u16,
    pub upstream_name: String,
    /// Port each worker listens on.
    pub upstream_port: u16,
    /// Connect, send and read timeout for proxied requests.
    pub timeout: Duration,
}

impl Default for NginxSettings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/app/nginx/nginx.conf"),
            reload_command: vec!["nginx".into(), "-s".into(), "reload".into()],
            listen_port: 80,
            upstream_name: "backend".into(),
            upstream_port: 5004,
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Render the config for `addresses`, in the order given.
///
/// An empty list yields a single `down` placeholder server; nginx refuses
/// to load an upstream block with no servers.
pub fn render(addresses: &[String], settings: &NginxSettings) -> String {
    let port = settings.upstream_port;
    let timeout = format!("{}s", settings.timeout.as_secs());

    let mut servers = String::new();
    if addresses.is_empty() {
        let _ = writeln!(servers, "    server 127.0.0.1:{port} down;");
    }
    for addr in addresses {
        let _ = writeln!(servers, "    server {addr}:{port};");
    }

    let upstream = &settings.upstream_name;
    let listen = settings.listen_port;
    format!(
        "upstream {upstream} {{
{servers}}}

server {{
    listen {listen};
    location / {{
        proxy_pass http://{upstream};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_connect_timeout {timeout};
        proxy_send_timeout {timeout};
        proxy_read_timeout {timeout};
        send_timeout {timeout};
    }}
}}
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn one_server_line_per_address() {
        let conf = render(&addrs(&["172.18.0.2", "172.18.0.3"]), &NginxSettings::default());

        assert!(conf.starts_with("upstream backend {\n    server 172.18.0.2:5004;\n    server 172.18.0.3:5004;\n}"));
        assert!(conf.contains("listen 80;"));
        assert!(conf.contains("proxy_pass http://backend;"));
        assert!(conf.contains("proxy_read_timeout 3600s;"));
        assert!(!conf.contains("down;"));
    }

    #[test]
    fn empty_fleet_renders_placeholder() {
        let conf = render(&[], &NginxSettings::default());
        assert!(conf.contains("    server 127.0.0.1:5004 down;\n"));
        assert_eq!(conf.lines().filter(|l| l.starts_with("    server ")).count(), 1);
    }

    #[test]
    fn settings_are_applied() {
        let settings = NginxSettings {
            listen_port: 8080,
            upstream_name: "translation".into(),
            upstream_port: 9000,
            timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let conf = render(&addrs(&["10.0.0.1"]), &settings);

        assert!(conf.contains("upstream translation {"));
        assert!(conf.contains("server 10.0.0.1:9000;"));
        assert!(conf.contains("listen 8080;"));
        assert!(conf.contains("proxy_pass http://translation;"));
        assert!(conf.contains("send_timeout 30s;"));
    }
}
