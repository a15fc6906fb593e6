use std::sync::Arc;

use scenario_ai_harness::observability::init_observability;
use scenario_ai_harness::prelude::*;
use scenario_ai_harness::vendors::openai::OpenAiTransport;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), HarnessError> {
    init_observability();

    let orchestrator = Orchestrator::builder()
        .transport(Arc::new(OpenAiTransport::new()?))
        .config(ConnectionConfig::from_env()?)
        .build()?;

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Create a management scenario for a busy Friday lunch.".to_string());
    let session = Session::new(SessionConfig::named("stream-scenario"));
    let mut run = orchestrator
        .request(&session, Conversation::from_user(prompt))
        .await?;

    while let Some(event) = run.next_event().await {
        match event {
            StreamEvent::Fragment { text, .. } => print!("{text}"),
            StreamEvent::OfflineNotice { message, .. } => eprintln!("{message}"),
            StreamEvent::Completed { source, .. } => {
                println!();
                eprintln!("completed from {source:?}");
                break;
            }
            StreamEvent::Started { .. } => {}
        }
    }

    match run.finish_payload().await? {
        IntentPayload::Scenario(scenario) => {
            println!("{} ({} options)", scenario.title, scenario.data.options.len());
        }
        other => println!("{:?}", other.intent()),
    }
    Ok(())
}
