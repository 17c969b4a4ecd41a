//! 费用计算
//!
//! 纯函数：token 数 + 模型 → 美元费用。未知模型按 0 计费，不报错。

/// 每百万 token 的价格（美元）：(输入, 输出)
pub static MODEL_PRICING: phf::Map<&'static str, (f64, f64)> = phf::phf_map! {
    "gpt-4o" => (2.50, 10.00),
    "gpt-4o-mini" => (0.15, 0.60),
    "gpt-3.5-turbo" => (0.50, 1.50),
};

/// 美元到卢比的展示汇率，只用于显示
pub const USD_TO_INR: f64 = 86.0;

/// 查询模型单价，未知模型返回 (0, 0)
pub fn price_for(model: &str) -> (f64, f64) {
    MODEL_PRICING.get(model).copied().unwrap_or((0.0, 0.0))
}

/// 计算单次调用的费用（美元）
pub fn cost(prompt_tokens: u32, completion_tokens: u32, model: &str) -> f64 {
    let (input_price, output_price) = price_for(model);
    prompt_tokens as f64 / 1e6 * input_price + completion_tokens as f64 / 1e6 * output_price
}

/// 格式化为 `$0.0015 | ₹0.13`
pub fn format_cost(usd: f64) -> String {
    format!("${:.4} | ₹{:.2}", usd, usd * USD_TO_INR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_for_known_model() {
        let c = cost(100, 50, "gpt-4o");
        assert!((c - 0.00075).abs() < 1e-12);
        assert!((c + cost(100, 50, "gpt-4o") - 0.0015).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_model_costs_nothing() {
        assert_eq!(price_for("gpt-9-ultra"), (0.0, 0.0));
        assert_eq!(cost(1_000_000, 1_000_000, "gpt-9-ultra"), 0.0);
    }

    #[test]
    fn test_format_cost_converts_only_for_display() {
        assert_eq!(format_cost(0.0015), "$0.0015 | ₹0.13");
        assert_eq!(format_cost(1.0), "$1.0000 | ₹86.00");
    }
}
