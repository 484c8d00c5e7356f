//! 单轮对话状态机
//!
//! AwaitingModel -> ExecutingTools -> AwaitingModel ... -> Done | LoopLimitExceeded。
//! 轮次计数与终止条件集中在 TurnMachine 中，循环体只负责驱动它。

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    AwaitingModel,
    ExecutingTools,
    Done,
    LoopLimitExceeded,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Done | TurnState::LoopLimitExceeded)
    }
}

/// 轮次状态机：最多 max_tool_iterations + 1 次模型调用
#[derive(Debug)]
pub struct TurnMachine {
    state: TurnState,
    rounds: usize,
    max_tool_iterations: usize,
}

impl TurnMachine {
    pub fn new(max_tool_iterations: usize) -> Self {
        Self {
            state: TurnState::AwaitingModel,
            rounds: 0,
            max_tool_iterations,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// 已完成的工具轮数
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// 本轮最多允许的模型调用次数
    pub fn max_model_calls(&self) -> usize {
        self.max_tool_iterations + 1
    }

    /// 收到模型回复：有工具调用进入 ExecutingTools，否则 Done
    pub fn on_model_reply(&mut self, has_tool_calls: bool) -> TurnState {
        debug_assert_eq!(self.state, TurnState::AwaitingModel);
        self.state = if has_tool_calls {
            TurnState::ExecutingTools
        } else {
            TurnState::Done
        };
        self.state
    }

    /// 一轮工具结果全部写回：轮数超过上限则 LoopLimitExceeded，否则回到 AwaitingModel
    pub fn on_round_complete(&mut self) -> TurnState {
        debug_assert_eq!(self.state, TurnState::ExecutingTools);
        self.rounds += 1;
        self.state = if self.rounds > self.max_tool_iterations {
            TurnState::LoopLimitExceeded
        } else {
            TurnState::AwaitingModel
        };
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_answer_is_done() {
        let mut m = TurnMachine::new(4);
        assert_eq!(m.on_model_reply(false), TurnState::Done);
        assert!(m.state().is_terminal());
        assert_eq!(m.rounds(), 0);
    }

    #[test]
    fn test_ceiling_reached_after_max_plus_one_rounds() {
        let mut m = TurnMachine::new(2);
        let mut model_calls = 0;
        while !m.state().is_terminal() {
            model_calls += 1;
            m.on_model_reply(true);
            m.on_round_complete();
        }
        assert_eq!(m.state(), TurnState::LoopLimitExceeded);
        assert_eq!(model_calls, m.max_model_calls());
        assert_eq!(m.rounds(), 3);
    }

    #[test]
    fn test_zero_iterations_still_allows_one_call() {
        let mut m = TurnMachine::new(0);
        m.on_model_reply(true);
        assert_eq!(m.on_round_complete(), TurnState::LoopLimitExceeded);
    }
}
