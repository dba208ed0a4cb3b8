//! The togglebot mascot: three flags decide its picture, greeting and the
//! onboarding copy shown next to it.

use crate::client::HookedClient;
use crate::context::User;
use tracing::instrument;

pub const WINK_FLAG: &str = "togglebot-wink";
pub const SPEED_FLAG: &str = "togglebot-speed";
pub const TEXT_FLAG: &str = "example-text";

const DEFAULT_SPEED: &str = "off";
const DEFAULT_STEP: &str = "default";

const IMAGE: &str = "/images/togglebot.svg";
const IMAGE_WINK: &str = "/images/togglebot-wink.svg";
const IMAGE_UNICORN: &str = "/images/unicorn.svg";

const WELCOME: &str = "Welcome to DevCycle's example app.";

/// Everything the page needs to draw the mascot.
#[derive(Debug, Clone, PartialEq)]
pub struct Togglebot {
    pub wink: bool,
    pub speed: String,
    pub message: &'static str,
    pub image: &'static str,
    pub header: &'static str,
    pub body: &'static str,
}

impl Togglebot {
    /// Builds the view from raw flag values.
    pub fn from_flags(wink: bool, speed: impl Into<String>, step: &str) -> Self {
        let speed = speed.into();
        let (header, body) = onboarding_text(step);
        Self {
            wink,
            message: speed_message(&speed),
            image: image(wink, &speed),
            header,
            body,
            speed,
        }
    }

    /// Reads the three flags for `user` and builds the view.
    ///
    /// Flags are read concurrently; each one falls back to its default on its own.
    #[instrument(level = "debug", skip(client, user), fields(user_id = %user.user_id))]
    pub async fn resolve(client: &HookedClient, user: &User) -> Self {
        let (wink, speed, step) = tokio::join!(
            client.bool_value(user, WINK_FLAG, false),
            client.string_value(user, SPEED_FLAG, DEFAULT_SPEED),
            client.string_value(user, TEXT_FLAG, DEFAULT_STEP),
        );
        Self::from_flags(wink, speed, &step)
    }
}

pub fn speed_message(speed: &str) -> &'static str {
    match speed {
        "slow" => "Awesome, look at you go!",
        "fast" => "This is fun!",
        "off-axis" => "...I'm gonna be sick...",
        "surprise" => "What the unicorn?",
        _ => "Hello! Nice to meet you.",
    }
}

pub fn image(wink: bool, speed: &str) -> &'static str {
    match (speed, wink) {
        ("surprise", _) => IMAGE_UNICORN,
        (_, true) => IMAGE_WINK,
        (_, false) => IMAGE,
    }
}

/// Header and body for an onboarding step.
pub fn onboarding_text(step: &str) -> (&'static str, &'static str) {
    match step {
        "step-1" => (
            WELCOME,
            "If you got here through the onboarding flow, just follow the instructions to change and create new Variations and see how the app reacts to new Variable values.",
        ),
        "step-2" => (
            "Great! You've taken the first step in exploring DevCycle.",
            "You've successfully toggled your very first Variation. You are now serving a different value to your users and you can see how the example app has reacted to this change. Next, go ahead and create a whole new Variation to see what else is possible in this app.",
        ),
        "step-3" => (
            "You're getting the hang of things.",
            "By creating a new Variation with new Variable values and toggling it on for all users, you've already explored the fundamental concepts within DevCycle. There's still so much more to the platform, so go ahead and complete the onboarding flow and play around with the feature that controls this example in your dashboard.",
        ),
        _ => (
            WELCOME,
            "If you got to the example app on your own, follow our README guide to create the Feature and Variables you need to control this app in DevCycle.",
        ),
    }
}
