use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::ai::chat::ChatBuilder;
use crate::ai::prompt;
use crate::core::AppConfig;
use crate::openai::OpenAiGateway;

const CLEAR_COMMAND: &str = "/clear";

pub async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;
    let mut rl = DefaultEditor::new()?;

    let gateway = Arc::new(OpenAiGateway::from_config(&config));
    let system_prompt = prompt::system_prompt()?;
    let mut chat = ChatBuilder::new(gateway, &system_prompt)
        .max_history_turns(config.max_history_turns)
        .build();

    println!("💪 Gym Assistant. Ask me anything about fitness, workouts, or nutrition.");
    println!("Type {} to start over, Ctrl-D to quit.", CLEAR_COMMAND);

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;
                if line == CLEAR_COMMAND {
                    chat.clear();
                    println!("Chat cleared.");
                    continue;
                }

                let mut stdout = io::stdout();
                chat.next_msg(line, |fragment| {
                    print!("{}", fragment);
                    let _ = stdout.flush();
                })
                .await;
                println!("\n");
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
