use sipua::application::event_relay;
use sipua::config::Config;
use sipua::domain::SipCallRtp;
use sipua::infrastructure::protocols::sip::{
    LoggingTransport, SipServerInfo, SipUserAgent, SipUserAgentCallback,
};
use sipua::infrastructure::protocols::stun::{integrity, verify_message_integrity, StunCredential, StunMessage};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application-side handler that only logs what the user agent reports
struct LogHandler;

impl SipUserAgentCallback for LogHandler {
    fn event_register(&self, server: &SipServerInfo, status: u16) {
        info!("Registered with {}:{} -> {}", server.ip, server.port, status);
    }

    fn event_incoming_call(&self, call_id: &str, from: &str, to: &str, rtp: Option<&SipCallRtp>) {
        info!("Incoming call {} from {} to {} (rtp: {:?})", call_id, from, to, rtp);
    }

    fn event_call_ring(&self, call_id: &str, sip_status: u16, _rtp: Option<&SipCallRtp>) {
        info!("Call {} ringing ({})", call_id, sip_status);
    }

    fn event_call_start(&self, call_id: &str, rtp: Option<&SipCallRtp>) {
        info!("Call {} started (rtp: {:?})", call_id, rtp);
    }

    fn event_call_end(&self, call_id: &str, sip_status: u16) {
        info!("Call {} ended ({})", call_id, sip_status);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting sipua");

    let path = std::env::args().nth(1).unwrap_or_else(|| "sipua".to_string());
    let config = Config::load(&path)?;
    info!("Configuration loaded: {:?}", config.sip);

    if !integrity::init() {
        anyhow::bail!("STUN integrity self-test failed");
    }

    let (relay, receiver) = event_relay();
    let consumer = tokio::spawn(async move { receiver.run(&LogHandler).await });

    let user_agent = SipUserAgent::new(config.sip.clone(), Arc::new(LoggingTransport))
        .with_callback(Arc::new(relay));

    let sip = config.sip.clone();
    tokio::task::spawn_blocking(move || demo_call(&user_agent, &sip.user_id)).await??;

    demo_stun(&StunCredential::from_config(&config.stun))?;

    consumer.await?;
    info!("sipua finished");
    Ok(())
}

/// Place a call and cancel it before it is answered
fn demo_call(user_agent: &SipUserAgent, user_id: &str) -> anyhow::Result<()> {
    let rtp = SipCallRtp::new(user_agent.config().local_ip.clone(), 10000, 0).with_codecs(vec![0, 8, 101]);
    let call_id = user_agent.start_call(user_id, "echo", &rtp)?;
    info!("Dialogs: {}", user_agent.dialog_count());

    if !user_agent.stop_call(&call_id, 0) {
        warn!("Call {} was already gone", call_id);
    }
    Ok(())
}

/// Sign a binding request and check it
fn demo_stun(credential: &StunCredential) -> anyhow::Result<()> {
    let mut request = StunMessage::new_binding_request();
    request.add_software(concat!("sipua/", env!("CARGO_PKG_VERSION")));
    request.add_username(&credential.username);
    request.add_message_integrity();

    let bytes = request.to_vec(Some(credential))?;
    info!(
        "STUN binding request: {} bytes, integrity ok: {}",
        bytes.len(),
        verify_message_integrity(&bytes, credential)
    );
    Ok(())
}
