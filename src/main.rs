mod config;
mod game;
mod leaderboard;
mod quiz;
mod trivia;
mod ui;

use std::sync::Arc;

use dotenv::dotenv;
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::KeyboardRemove,
    utils::command::BotCommands,
};

use config::Config;
use game::{GameError, GameHub};
use leaderboard::{FileStore, Leaderboard};
use quiz::session::QuizError;
use quiz::{normalize_player_name, Category, CategoryChoice, Difficulty, QuizSetup};
use trivia::OpenTdb;
use ui::Action;

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceivePlayerName,
    ReceiveCategory {
        player_name: String,
        categories: Vec<Category>,
    },
    ReceiveDifficulty {
        player_name: String,
        category: CategoryChoice,
    },
    Playing {
        player_name: String,
        category: CategoryChoice,
    },
}

impl State {
    fn player_name(&self) -> Option<&str> {
        match self {
            State::ReceiveCategory { player_name, .. }
            | State::ReceiveDifficulty { player_name, .. }
            | State::Playing { player_name, .. } => Some(player_name),
            State::Start | State::ReceivePlayerName => None,
        }
    }

    fn category(&self) -> Option<&CategoryChoice> {
        match self {
            State::ReceiveDifficulty { category, .. } | State::Playing { category, .. } => {
                Some(category)
            }
            _ => None,
        }
    }
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
    #[command(description = "start a new quiz.")]
    Start,
    #[command(description = "show this text.")]
    Help,
    #[command(description = "skip to the next question.")]
    Next,
    #[command(description = "leave the quiz and pick another category.")]
    Back,
    #[command(description = "stop playing.")]
    Quit,
    #[command(description = "turn answer notifications on or off.")]
    Sound,
    #[command(description = "show the leaderboard.")]
    Leaderboard,
    #[command(description = "clear the leaderboard.")]
    Clear,
}

type DialogueStorage = Arc<ErasedStorage<State>>;

#[tokio::main]
async fn main() -> HandlerResult {
    // Variables may just as well come from the real environment
    dotenv().ok();

    pretty_env_logger::init();
    log::info!("Starting trivia bot...");

    let config = Config::from_env()?;
    let bot = Bot::from_env();

    log::info!("Opening dialogue storage at {}", config.dialogue_db);
    let storage: DialogueStorage = SqliteStorage::open(&config.dialogue_db, Json)
        .await?
        .erase();

    log::info!("Leaderboard lives in {}", config.data_dir.display());
    let leaderboard = Arc::new(Leaderboard::new(FileStore::new(&config.data_dir)));
    let source = OpenTdb::new(config.api_url.clone())?;
    let hub = GameHub::new(bot.clone(), source, leaderboard);

    bot.set_my_commands(Command::bot_commands()).await?;

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, ErasedStorage<State>, State>()
                .branch(dptree::entry().filter_command::<Command>().endpoint(command))
                .branch(dptree::case![State::Start].endpoint(start))
                .branch(dptree::case![State::ReceivePlayerName].endpoint(receive_player_name))
                .branch(
                    dptree::case![State::ReceiveCategory {
                        player_name,
                        categories
                    }]
                    .endpoint(receive_category),
                )
                .branch(
                    dptree::case![State::ReceiveDifficulty {
                        player_name,
                        category
                    }]
                    .endpoint(receive_difficulty),
                )
                .branch(
                    dptree::case![State::Playing {
                        player_name,
                        category
                    }]
                    .endpoint(playing),
                ),
        )
        .branch(
            Update::filter_callback_query()
                .enter_dialogue::<CallbackQuery, ErasedStorage<State>, State>()
                .endpoint(callback),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![storage, hub])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

const GREETING_TEXT: &str =
    "Hi! I'm the trivia bot: 15 questions, 15 seconds each. What's your name?";
async fn start(bot: Bot, dialogue: QuizDialogue, hub: Arc<GameHub>, msg: Message) -> HandlerResult {
    hub.reset(msg.chat.id).await;
    bot.send_message(msg.chat.id, GREETING_TEXT)
        .reply_markup(ui::name_keyboard())
        .await?;

    dialogue.update(State::ReceivePlayerName).await?;
    Ok(())
}

async fn receive_player_name(
    bot: Bot,
    dialogue: QuizDialogue,
    hub: Arc<GameHub>,
    msg: Message,
) -> HandlerResult {
    let Some(name) = msg.text() else {
        bot.send_message(msg.chat.id, "Please send your name as text")
            .await?;
        return Ok(());
    };

    let player_name = normalize_player_name(name);
    bot.send_message(msg.chat.id, format!("Nice to meet you, {}!", player_name))
        .await?;
    ask_category(&bot, &dialogue, &hub, msg.chat.id, player_name).await
}

async fn ask_category(
    bot: &Bot,
    dialogue: &QuizDialogue,
    hub: &GameHub,
    chat: ChatId,
    player_name: String,
) -> HandlerResult {
    let categories = hub.categories().await;
    if categories.is_empty() {
        bot.send_message(
            chat,
            "I couldn't load the category list, but you can still play with any category.",
        )
        .await?;
    }

    bot.send_message(chat, "Pick a category")
        .reply_markup(ui::category_keyboard(&categories))
        .await?;
    dialogue
        .update(State::ReceiveCategory {
            player_name,
            categories,
        })
        .await?;
    Ok(())
}

async fn receive_category(
    bot: Bot,
    dialogue: QuizDialogue,
    (player_name, categories): (String, Vec<Category>),
    msg: Message,
) -> HandlerResult {
    let Some(category) = msg.text().and_then(|text| ui::pick_category(&categories, text)) else {
        bot.send_message(msg.chat.id, "Please choose one of the categories")
            .await?;
        return Ok(());
    };

    bot.send_message(msg.chat.id, "Pick a difficulty")
        .reply_markup(ui::difficulty_keyboard())
        .await?;
    dialogue
        .update(State::ReceiveDifficulty {
            player_name,
            category,
        })
        .await?;
    Ok(())
}

async fn receive_difficulty(
    bot: Bot,
    dialogue: QuizDialogue,
    hub: Arc<GameHub>,
    (player_name, category): (String, CategoryChoice),
    msg: Message,
) -> HandlerResult {
    let chat = msg.chat.id;
    let Some(difficulty) = msg.text().and_then(Difficulty::from_label) else {
        bot.send_message(chat, "Please choose one of the difficulties")
            .await?;
        return Ok(());
    };

    bot.send_message(chat, "Loading questions...")
        .reply_markup(KeyboardRemove::new())
        .await?;
    dialogue
        .update(State::Playing {
            player_name: player_name.clone(),
            category: category.clone(),
        })
        .await?;

    let setup = QuizSetup::new(&player_name, category, difficulty);
    match hub.start(chat, setup).await {
        Ok(()) | Err(GameError::Quiz(QuizError::Stale)) => Ok(()),
        Err(GameError::Quiz(QuizError::EmptyResultSet)) => {
            bot.send_message(chat, ui::NO_QUESTIONS).await?;
            ask_category(&bot, &dialogue, &hub, chat, player_name).await
        }
        Err(GameError::Source(err)) => {
            log::warn!("Could not fetch questions for chat {}: {}", chat.0, err);
            bot.send_message(
                chat,
                "I couldn't reach the trivia service. Please try again in a moment.",
            )
            .await?;
            ask_category(&bot, &dialogue, &hub, chat, player_name).await
        }
        Err(err) => Err(err.into()),
    }
}

/// Text typed while a question is on screen counts as an answer when it
/// matches one of the options. Once the quiz is over there is nothing to answer.
async fn playing(bot: Bot, hub: Arc<GameHub>, msg: Message) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    match hub.answer_text(msg.chat.id, text).await {
        Ok(()) => Ok(()),
        Err(GameError::Quiz(QuizError::NotInProgress)) => {
            bot.send_message(msg.chat.id, ui::NO_QUESTION_SHOWN).await?;
            Ok(())
        }
        Err(GameError::Quiz(_)) => {
            bot.send_message(
                msg.chat.id,
                "Tap one of the buttons under the question to answer. /next skips it, /back leaves the quiz.",
            )
            .await?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn command(
    bot: Bot,
    dialogue: QuizDialogue,
    hub: Arc<GameHub>,
    msg: Message,
    cmd: Command,
) -> HandlerResult {
    let chat = msg.chat.id;
    match cmd {
        Command::Start => return start(bot, dialogue, hub, msg).await,
        Command::Help => {
            bot.send_message(chat, Command::descriptions().to_string())
                .await?;
        }
        Command::Next => match hub.skip(chat).await {
            Ok(()) => {}
            Err(GameError::Quiz(_)) => {
                bot.send_message(chat, "There is no question to skip.")
                    .await?;
            }
            Err(err) => return Err(err.into()),
        },
        Command::Back => go_home(&bot, &dialogue, &hub, chat).await?,
        Command::Quit => quit(&bot, &dialogue, &hub, chat).await?,
        Command::Sound => {
            let sound_on = hub.toggle_sound(chat).await;
            bot.send_message(chat, ui::sound_text(sound_on)).await?;
        }
        Command::Leaderboard => {
            let category = dialogue
                .get()
                .await?
                .and_then(|state| state.category().cloned())
                .unwrap_or_default();
            bot.send_message(chat, hub.leaderboard_text(&category))
                .await?;
        }
        Command::Clear => {
            bot.send_message(chat, ui::CLEAR_PROMPT)
                .reply_markup(ui::clear_keyboard())
                .await?;
        }
    }
    Ok(())
}

async fn callback(
    bot: Bot,
    dialogue: QuizDialogue,
    hub: Arc<GameHub>,
    q: CallbackQuery,
) -> HandlerResult {
    let chat = dialogue.chat_id();
    let action = q.data.as_deref().and_then(Action::parse);
    bot.answer_callback_query(q.id).await?;

    match action {
        Some(Action::Answer { ticket, option }) => match hub.answer(chat, ticket, option).await {
            // Late presses on an old or already answered question
            Ok(()) | Err(GameError::Quiz(_)) => {}
            Err(err) => return Err(err.into()),
        },
        Some(Action::Restart) => {
            hub.reset(chat).await;
            bot.send_message(chat, "New game! What's your name?")
                .reply_markup(ui::name_keyboard())
                .await?;
            dialogue.update(State::ReceivePlayerName).await?;
        }
        Some(Action::Home) => go_home(&bot, &dialogue, &hub, chat).await?,
        Some(Action::Quit) => quit(&bot, &dialogue, &hub, chat).await?,
        Some(Action::ClearAsk) => {
            bot.send_message(chat, ui::CLEAR_PROMPT)
                .reply_markup(ui::clear_keyboard())
                .await?;
        }
        Some(Action::ClearConfirm) => match hub.clear_leaderboard() {
            Ok(()) => {
                bot.send_message(chat, ui::CLEARED).await?;
            }
            Err(err) => {
                log::warn!("Could not clear leaderboard: {}", err);
                bot.send_message(chat, "I couldn't clear the leaderboard, sorry.")
                    .await?;
            }
        },
        Some(Action::ClearCancel) => {
            bot.send_message(chat, "Leaderboard kept.").await?;
        }
        Some(Action::Noop) | None => {}
    }
    Ok(())
}

/// Leaves the quiz and goes back to choosing a category, keeping the name.
async fn go_home(bot: &Bot, dialogue: &QuizDialogue, hub: &GameHub, chat: ChatId) -> HandlerResult {
    hub.reset(chat).await;
    let player_name = dialogue
        .get()
        .await?
        .and_then(|state| state.player_name().map(str::to_string));

    match player_name {
        Some(player_name) => ask_category(bot, dialogue, hub, chat, player_name).await,
        None => {
            bot.send_message(chat, GREETING_TEXT)
                .reply_markup(ui::name_keyboard())
                .await?;
            dialogue.update(State::ReceivePlayerName).await?;
            Ok(())
        }
    }
}

async fn quit(bot: &Bot, dialogue: &QuizDialogue, hub: &GameHub, chat: ChatId) -> HandlerResult {
    hub.leave(chat).await;
    bot.send_message(chat, ui::GOODBYE)
        .reply_markup(KeyboardRemove::new())
        .await?;
    dialogue.exit().await?;
    Ok(())
}
