//! chef-solo setup on a node.
//!
//! [`configure`] runs before every cook: it prepares the working directory
//! and writes `/etc/chef/client.rb`. [`install`] puts chef itself on a node
//! with the omnibus installer.

use crate::context::{RunContext, RunSettings};
use crate::error::{Error, Result};
use kitchen::Node;
use remote::{Transport, shell_quote};
use std::path::Path;

/// Omnibus installer script.
pub const INSTALLER_URL: &str = "https://www.chef.io/chef/install.sh";

/// Where the installer is staged on the node.
pub const REMOTE_INSTALLER: &str = "/tmp/install.sh";

/// chef-solo configuration file.
pub const CLIENT_RB: &str = "/etc/chef/client.rb";

/// Where the encrypted data bag secret is installed for a run.
pub const SECRET_PATH: &str = "/etc/chef/encrypted_data_bag_secret";

const MAX_INSTALLER_SIZE: u64 = 1024 * 1024;

/// Apply the base chef-solo configuration to a node.
///
/// Idempotent. The first remote call doubles as a login check, so a node
/// that can't be reached fails here with [`Error::Connectivity`].
pub fn configure(ctx: &RunContext<'_>, node: &Node, transport: &dyn Transport) -> Result<()> {
    let settings = ctx.settings;
    let cache_dir = settings.remote_path("cache");
    let remote_err = |e: remote::Error| Error::from_transport(&node.name, e);

    let cache_exists = transport.exists(&cache_dir).map_err(|e| Error::Connectivity {
        node: node.name.clone(),
        message: format!("could not log in: {e}"),
    })?;
    if !cache_exists {
        transport
            .run(&format!("mkdir -p {}", shell_quote(&cache_dir)), true)
            .map_err(remote_err)?;
    }

    // the mirror sync runs as the login user
    let owner = settings
        .remote_user
        .as_deref()
        .map_or_else(|| "\"$SUDO_USER\"".to_string(), shell_quote);
    transport
        .run(
            &format!(
                "chown -R {owner} {}",
                shell_quote(&settings.node_work_path)
            ),
            true,
        )
        .map_err(remote_err)?;

    if let Some(log_dir) = Path::new(&settings.log_file).parent().and_then(Path::to_str)
        && !log_dir.is_empty()
        && !transport.exists(log_dir).map_err(remote_err)?
    {
        transport
            .run(&format!("mkdir -p {}", shell_quote(log_dir)), true)
            .map_err(remote_err)?;
    }

    if !transport.exists("/etc/chef").map_err(remote_err)? {
        transport
            .run("mkdir -p /etc/chef && chmod -R 774 /etc/chef", true)
            .map_err(remote_err)?;
    }

    let client_rb = render_client_rb(settings, &cookbook_paths(ctx), &node.chef_environment);
    transport
        .write_file(CLIENT_RB, client_rb.as_bytes(), true)
        .and_then(|()| transport.own_by_root(CLIENT_RB, "644"))
        .map_err(remote_err)?;

    log::debug!("[{}] chef-solo configured", node.name);
    Ok(())
}

/// Cookbook directories as chef-solo sees them, lowest priority first.
fn cookbook_paths(ctx: &RunContext<'_>) -> Vec<String> {
    let vendored = ctx
        .settings
        .vendored_cookbooks
        .as_deref()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_string());

    vendored
        .into_iter()
        .chain(ctx.layout.cookbook_paths.iter().rev().cloned())
        .map(|p| ctx.settings.remote_path(&p))
        .collect()
}

fn ruby_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render `/etc/chef/client.rb`.
pub fn render_client_rb(settings: &RunSettings, cookbook_paths: &[String], environment: &str) -> String {
    let work = settings.node_work_path.trim_end_matches('/');
    let cookbooks = cookbook_paths
        .iter()
        .map(String::as_str)
        .map(ruby_string)
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = String::new();
    out.push_str(&format!("base = {}\n", ruby_string(work)));
    out.push_str("file_cache_path File.join(base, \"cache\")\n");
    out.push_str(&format!("cookbook_path [{cookbooks}]\n"));
    out.push_str("role_path File.join(base, \"roles\")\n");
    out.push_str("data_bag_path File.join(base, \"data_bags\")\n");
    out.push_str("environment_path File.join(base, \"environments\")\n");
    out.push_str(&format!("environment {}\n", ruby_string(environment)));
    out.push_str(&format!("verbose_logging {}\n", settings.verbose));

    if settings.encrypted_data_bag_secret.is_some() {
        out.push_str(&format!(
            "encrypted_data_bag_secret {}\n",
            ruby_string(SECRET_PATH)
        ));
    }
    let proxies = [
        ("http_proxy", &settings.proxies.http),
        ("https_proxy", &settings.proxies.https),
        ("no_proxy", &settings.proxies.no_proxy),
    ];
    for (key, value) in proxies {
        if let Some(value) = value {
            out.push_str(&format!("{key} {}\n", ruby_string(value)));
        }
    }
    if let Some(formatter) = &settings.formatter {
        out.push_str(&format!("formatter {}\n", ruby_string(formatter)));
    }
    out
}

/// Whether chef-solo is installed on the node.
pub fn chef_available(transport: &dyn Transport) -> Result<bool> {
    let output = transport
        .execute("chef-solo --version", true)
        .map_err(|e| Error::from_transport(transport.host(), e))?;
    Ok(!missing_agent(&output.combined()))
}

pub(crate) fn missing_agent(output: &str) -> bool {
    output.contains("chef-solo: command not found") || output.contains("chef-solo: not found")
}

/// Download the omnibus installer script.
pub fn download_installer(url: &str) -> Result<Vec<u8>> {
    let agent = ureq::Agent::new_with_defaults();
    let mut response = agent
        .get(url)
        .header("User-Agent", "sous")
        .call()?;
    let script = response
        .body_mut()
        .with_config()
        .limit(MAX_INSTALLER_SIZE)
        .read_to_vec()?;
    Ok(script)
}

/// Install chef on a node from an already downloaded installer script.
///
/// Installs the latest release when `version` is `None`.
pub fn install_with(transport: &dyn Transport, script: &[u8], version: Option<&str>) -> Result<()> {
    let host = transport.host().to_string();
    let remote_err = |e: remote::Error| Error::from_transport(&host, e);

    transport
        .write_file(REMOTE_INSTALLER, script, false)
        .map_err(remote_err)?;

    let mut command = format!("bash {REMOTE_INSTALLER}");
    if let Some(version) = version {
        command.push_str(&format!(" -v {}", shell_quote(version)));
    }
    log::info!(
        "[{host}] installing chef {}",
        version.unwrap_or("(latest)")
    );
    let installed = transport.run(&command, true).map_err(remote_err);

    if let Err(e) = transport.remove(REMOTE_INSTALLER, false) {
        log::warn!("[{host}] could not remove {REMOTE_INSTALLER}: {e}");
    }
    installed.map(drop)
}

/// Download the installer and install chef on a node.
pub fn install(transport: &dyn Transport, version: Option<&str>) -> Result<()> {
    let script = download_installer(INSTALLER_URL)?;
    install_with(transport, &script, version)
}
