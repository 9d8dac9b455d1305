// Two-turn chat: each reply is kept as history for the next turn.
//
// Needs ANTHROPIC_API_KEY.
//
// Run: cargo run --example chat_turns

use refine_line::{LlmClient, Message};

fn main() {
    let client = match LlmClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(2);
        }
    };

    let mut history: Vec<Message> = Vec::new();

    for turn in ["こんにちは！", "おっす！"] {
        println!("> {turn}");
        history.push(Message::user(turn));

        let reply = match client.request().messages(history.clone()).send() {
            Ok(reply) => reply,
            Err(e) => {
                eprintln!("request failed: {e}");
                std::process::exit(1);
            }
        };
        println!("{reply}\n");

        history.push(Message::assistant(reply));
    }

    println!("({} messages in history)", history.len());
}
