//! UCB1 组合搜索
//!
//! 臂集合是可增长的竞技场：`Vec<Combo>` 按插入顺序存放，ComboId 即下标，key → id 的映射保证
//! 组合唯一。扩展只追加，已有 ComboId 永不失效。

use std::collections::HashMap;

use crate::optimizer::types::{Combo, ComboId, SelectionKind, Statistic};

/// UCB1 分数：mean + sqrt(2 ln(t+1) / count)；count 为 0 时为 +∞
pub fn ucb_score(stat: &Statistic, trial: usize) -> f64 {
    if stat.trial_count == 0 {
        return f64::INFINITY;
    }
    let bonus = (2.0 * ((trial + 1) as f64).ln() / stat.trial_count as f64).sqrt();
    stat.mean() + bonus
}

#[derive(Debug, Default, Clone)]
pub struct BanditSearch {
    combos: Vec<Combo>,
    stats: Vec<Statistic>,
    index: HashMap<String, ComboId>,
}

impl BanditSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个组合；key 已存在时返回 None
    pub fn add_combo(&mut self, combo: Combo) -> Option<ComboId> {
        let key = combo.key();
        if self.index.contains_key(&key) {
            return None;
        }
        let id = ComboId(self.combos.len());
        self.index.insert(key, id);
        self.combos.push(combo);
        self.stats.push(Statistic::default());
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.combos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }

    pub fn combo(&self, id: ComboId) -> &Combo {
        &self.combos[id.0]
    }

    /// 按注册顺序遍历 (id, combo, stat)
    pub fn iter(&self) -> impl Iterator<Item = (ComboId, &Combo, &Statistic)> {
        self.combos
            .iter()
            .zip(self.stats.iter())
            .enumerate()
            .map(|(i, (c, s))| (ComboId(i), c, s))
    }

    /// 为第 `trial` 次试验选择组合；没有任何组合时返回 None
    ///
    /// 1. 热启动：trial < 组合数 → combos[trial]
    /// 2. 有未观测组合 → 第一个未观测者
    /// 3. 否则取 UCB1 最大者，并列取注册顺序靠前者
    pub fn select(&self, trial: usize) -> Option<(ComboId, SelectionKind)> {
        if self.combos.is_empty() {
            return None;
        }
        if trial < self.combos.len() {
            return Some((ComboId(trial), SelectionKind::WarmStart));
        }
        if let Some(i) = self.stats.iter().position(|s| s.trial_count == 0) {
            return Some((ComboId(i), SelectionKind::Unexplored));
        }

        let mut best = 0;
        let mut best_ucb = f64::NEG_INFINITY;
        for (i, stat) in self.stats.iter().enumerate() {
            let ucb = ucb_score(stat, trial);
            if ucb > best_ucb {
                best_ucb = ucb;
                best = i;
            }
        }
        Some((ComboId(best), SelectionKind::Ucb))
    }

    pub fn record(&mut self, id: ComboId, score: f64) {
        self.stats[id.0].record(score);
    }
}
