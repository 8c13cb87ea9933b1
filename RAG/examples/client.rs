use rag_chat::Endpoints;
use reqwest::Client;
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let client = Client::new();
    let base_url = Endpoints::from_env()?.api_base_url();

    println!("🔍 Testing RAG chat API at {}", base_url);

    // Test health check
    println!("\n📋 Health Check:");
    let health_response = client.get(format!("{}/health", base_url)).send().await?;
    println!("Status: {}", health_response.status());
    let health_json: serde_json::Value = health_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&health_json)?);

    // Create a session
    println!("\n🗂️ Create Session:");
    let session_json: serde_json::Value = client
        .post(format!("{}/create-session", base_url))
        .json(&json!({ "session_name": "client demo" }))
        .send()
        .await?
        .json()
        .await?;
    println!("Response: {}", serde_json::to_string_pretty(&session_json)?);
    let session_id = session_json["session_id"]
        .as_str()
        .unwrap_or("default_session")
        .to_string();

    // Ask a question
    println!("\n💬 Chat:");
    let chat_response = client
        .post(format!("{}/chat", base_url))
        .json(&json!({
            "message": "What are the main topics discussed in the uploaded documents?",
            "session_id": session_id,
        }))
        .send()
        .await?;
    println!("Status: {}", chat_response.status());
    let chat_json: serde_json::Value = chat_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&chat_json)?);

    // Session info
    println!("\n📚 Session Info:");
    let info_json: serde_json::Value = client
        .get(format!("{}/session-info/{}", base_url, session_id))
        .send()
        .await?
        .json()
        .await?;
    println!("Response: {}", serde_json::to_string_pretty(&info_json)?);

    println!("\n✅ Client test completed!");
    Ok(())
}
