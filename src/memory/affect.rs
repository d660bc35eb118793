//! 情感状态：每个用户一条 affection / mood / energy 记录
//!
//! 读取即衰减：`read` 先按距上次更新的时长恢复 energy、让 mood 回归 0，然后落盘。
//! 所有增量都被夹在各自区间内。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::persistence::JsonFile;

pub const AFFECTION_RANGE: (i64, i64) = (0, 100);
pub const MOOD_RANGE: (i64, i64) = (-50, 50);
pub const ENERGY_RANGE: (i64, i64) = (0, 100);

/// 单个用户的情感状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectState {
    pub affection: i64,
    pub mood: i64,
    pub energy: i64,
    pub last_update: DateTime<Local>,
}

impl AffectState {
    /// 新用户默认：同学/朋友程度的好感、平静、精力充沛
    pub fn initial(now: DateTime<Local>) -> Self {
        Self {
            affection: 50,
            mood: 0,
            energy: 80,
            last_update: now,
        }
    }

    /// 按经过的整小时恢复：energy 每小时 +10，mood 每小时向 0 靠拢 5；不足 1 小时不变
    pub fn apply_time_effects(&mut self, now: DateTime<Local>) {
        let elapsed_hours = (now - self.last_update).num_seconds() as f64 / 3600.0;
        if elapsed_hours < 1.0 {
            return;
        }
        let energy_rec = (elapsed_hours * 10.0) as i64;
        self.energy = (self.energy.saturating_add(energy_rec)).min(ENERGY_RANGE.1);

        let mood_rec = (elapsed_hours * 5.0) as i64;
        if self.mood > 0 {
            self.mood = (self.mood - mood_rec).max(0);
        } else if self.mood < 0 {
            self.mood = (self.mood + mood_rec).min(0);
        }
        self.last_update = now;
    }

    /// 应用夹紧后的增量
    pub fn apply_delta(&mut self, delta: AffectDelta, now: DateTime<Local>) {
        self.affection = clamp_add(self.affection, delta.affection, AFFECTION_RANGE);
        self.mood = clamp_add(self.mood, delta.mood, MOOD_RANGE);
        self.energy = clamp_add(self.energy, delta.energy, ENERGY_RANGE);
        self.last_update = now;
    }
}

fn clamp_add(value: i64, delta: i64, (lo, hi): (i64, i64)) -> i64 {
    value.saturating_add(delta).clamp(lo, hi)
}

/// 情感参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffectParam {
    Affection,
    Mood,
    Energy,
}

impl AffectParam {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "affection" => Some(Self::Affection),
            "mood" => Some(Self::Mood),
            "energy" => Some(Self::Energy),
            _ => None,
        }
    }
}

/// 情感增量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AffectDelta {
    pub affection: i64,
    pub mood: i64,
    pub energy: i64,
}

impl AffectDelta {
    pub fn single(param: AffectParam, amount: i64) -> Self {
        let mut d = Self::default();
        match param {
            AffectParam::Affection => d.affection = amount,
            AffectParam::Mood => d.mood = amount,
            AffectParam::Energy => d.energy = amount,
        }
        d
    }
}

/// 情感存储：emotion.json，键为用户标识；每次读写前重新读盘
pub struct AffectStore {
    file: JsonFile<BTreeMap<String, AffectState>>,
    io_lock: Mutex<()>,
}

impl AffectStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            file: JsonFile::new(path),
            io_lock: Mutex::new(()),
        }
    }

    /// 读取用户状态（不存在则初始化），先衰减再落盘
    pub fn read(&self, user_key: &str) -> Result<AffectState, AgentError> {
        self.read_at(user_key, Local::now())
    }

    pub fn read_at(&self, user_key: &str, now: DateTime<Local>) -> Result<AffectState, AgentError> {
        let _guard = self.io_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut states = self.file.load_or_default();
        let state = states
            .entry(user_key.to_string())
            .or_insert_with(|| AffectState::initial(now));
        state.apply_time_effects(now);
        let snapshot = state.clone();
        self.file.save(&states)?;
        Ok(snapshot)
    }

    /// 先衰减再应用夹紧增量，落盘并返回新状态
    pub fn update(&self, user_key: &str, delta: AffectDelta) -> Result<AffectState, AgentError> {
        self.update_at(user_key, delta, Local::now())
    }

    pub fn update_at(
        &self,
        user_key: &str,
        delta: AffectDelta,
        now: DateTime<Local>,
    ) -> Result<AffectState, AgentError> {
        let _guard = self.io_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut states = self.file.load_or_default();
        let state = states
            .entry(user_key.to_string())
            .or_insert_with(|| AffectState::initial(now));
        state.apply_time_effects(now);
        state.apply_delta(delta, now);
        let snapshot = state.clone();
        self.file.save(&states)?;
        tracing::info!(
            user = %user_key,
            affection = snapshot.affection,
            mood = snapshot.mood,
            energy = snapshot.energy,
            "affect updated"
        );
        Ok(snapshot)
    }

    /// 生成注入 system prompt 的情感描述段落
    pub fn prompt_text(&self, user_key: &str) -> Result<String, AgentError> {
        Ok(render_prompt(&self.read(user_key)?))
    }
}

fn render_prompt(state: &AffectState) -> String {
    let aff_desc = match state.affection {
        a if a >= 90 => "Love (Devoted)",
        a if a >= 70 => "High Trust (Close)",
        a if a >= 40 => "Neutral (Friend)",
        _ => "Low (Stranger/Cold)",
    };
    let mood_desc = match state.mood {
        m if m >= 30 => "Excellent (Happy/Playful)",
        m if m >= 10 => "Good (Positive)",
        m if m >= -10 => "Neutral (Calm)",
        m if m >= -30 => "Bad (Annoyed/Sarcastic)",
        _ => "Terrible (Angry/Cold)",
    };
    let energy_desc = match state.energy {
        e if e >= 80 => "High (Energetic)",
        e if e >= 30 => "Normal",
        _ => "Low (Sleepy/Tired)",
    };
    format!(
        "[Emotional State]\n\
         - Affection: {} ({})\n\
         - Mood: {} ({})\n\
         - Energy: {} ({})\n\
         (Instruction: Adjust your tone based on these. Low Mood = Cold/Sarcastic. High Affection = Sweet/Deredere. Low Energy = Short/Lazy.)",
        state.affection, aff_desc, state.mood, mood_desc, state.energy, energy_desc
    )
}
