// Keyboard gamepad: stands in for the two controllers when no gamepad is attached
//
// Driver:   WASD strafe/drive, Z/X rotate, C speed toggle (circle)
// Operator: I/K intake reverse/forward, O intake stop, L lift, P shooter,
//           1/2 arm deploy/rest, 3/4 secondary arm raise/lower
// Enter starts the run, Q stops it and quits
//
// Usage: cargo run --example keyboard_gamepad

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use mecanum_teleop_runtime::config::{TOPIC_ACTIVE, TOPIC_INPUT};
use mecanum_teleop_runtime::messages::{ActiveSignal, InputSnapshot};

const HOLD_MS: u64 = 150; // Keys count as held this long after the last press/repeat

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_input = session.declare_publisher(TOPIC_INPUT).await?;
    let pub_active = session.declare_publisher(TOPIC_ACTIVE).await?;

    info!("Controls: WASD=move, Z/X=rotate, C=speed, I/K/O=intake, L=lift, P=shoot, 1-4=servos");
    info!("Enter=start, Q=stop and quit");

    enable_raw_mode()?;
    let result = run_teleop(&pub_input, &pub_active).await;
    disable_raw_mode()?;

    result
}

/// Most recent press time per key; a key is held while its press is fresh
struct HeldKeys {
    pressed_at: Vec<(char, Instant)>,
}

impl HeldKeys {
    fn press(&mut self, key: char) {
        self.pressed_at.retain(|(k, _)| *k != key);
        self.pressed_at.push((key, Instant::now()));
    }

    fn held(&self, key: char) -> bool {
        self.pressed_at
            .iter()
            .any(|(k, at)| *k == key && at.elapsed() < Duration::from_millis(HOLD_MS))
    }

    fn axis(&self, negative: char, positive: char) -> f64 {
        match (self.held(negative), self.held(positive)) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

fn snapshot(keys: &HeldKeys) -> InputSnapshot {
    let mut snap = InputSnapshot::default();

    let driver = &mut snap.driver;
    driver.left_stick_x = keys.axis('a', 'd');
    driver.left_stick_y = keys.axis('s', 'w');
    driver.right_stick_x = keys.axis('z', 'x');
    driver.circle = keys.held('c');

    let operator = &mut snap.operator;
    operator.dpad_up = keys.held('i');
    operator.dpad_down = keys.held('k');
    operator.cross = keys.held('o');
    operator.left_trigger = if keys.held('l') { 1.0 } else { 0.0 };
    operator.right_trigger = if keys.held('p') { 1.0 } else { 0.0 };
    operator.left_bumper = keys.held('1');
    operator.right_bumper = keys.held('2');
    operator.dpad_right = keys.held('3');
    operator.dpad_left = keys.held('4');

    snap
}

async fn run_teleop(
    pub_input: &zenoh::pubsub::Publisher<'_>,
    pub_active: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut keys = HeldKeys {
        pressed_at: Vec::new(),
    };

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Enter if pressed => {
                        let signal = serde_json::to_string(&ActiveSignal { active: true })?;
                        pub_active.put(signal).await?;
                        info!("Start sent");
                    }
                    KeyCode::Char('q') | KeyCode::Esc if pressed => {
                        let signal = serde_json::to_string(&ActiveSignal { active: false })?;
                        pub_active.put(signal).await?;
                        info!("Stop sent");
                        break;
                    }
                    KeyCode::Char(c) if pressed => keys.press(c.to_ascii_lowercase()),
                    _ => {}
                }
            }
        }

        // Always publish at ~50Hz
        let snap = serde_json::to_string(&snapshot(&keys))?;
        pub_input.put(snap).await?;
    }

    Ok(())
}
