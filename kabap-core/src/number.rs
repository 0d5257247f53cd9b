//! 数值工具
//!
//! Kabap 唯一的数据类型是字符串；数值只在运算时按需解码，运算结果再按
//! 当前 scale 编码回字符串。

/// 尝试从字符串提取数值，失败时返回给定默认值
pub(crate) fn extract(value: &str, default: f64) -> f64 {
    value.trim().parse::<f64>().unwrap_or(default)
}

/// 按 scale 位小数格式化，HALF_UP 舍入，去掉小数部分的尾随零
///
/// 整数结果不带小数点，`format(4.0, 3)` 得到 `"4"`。
pub(crate) fn format(value: f64, scale: i32) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let scale = scale.max(0);
    let factor = 10f64.powi(scale);
    let scaled = value * factor;
    // f64::round 对半时远离零，正是 HALF_UP 的平局规则
    let rounded = if scaled.is_finite() {
        scaled.round() / factor
    } else {
        value
    };

    let precision = scale as usize;
    let mut text = format!("{rounded:.precision$}");
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_numbers() {
        assert_eq!(extract("4", 0.0), 4.0);
        assert_eq!(extract("1.49", 0.0), 1.49);
        assert_eq!(extract("-2.5", 0.0), -2.5);
        assert_eq!(extract(" 7 ", 0.0), 7.0);
    }

    #[test]
    fn test_extract_falls_back_on_garbage() {
        assert_eq!(extract("abc", 0.0), 0.0);
        assert_eq!(extract("", -1.0), -1.0);
        assert_eq!(extract("12x", 3.0), 3.0);
    }

    #[test]
    fn test_format_integers_have_no_point() {
        assert_eq!(format(4.0, 3), "4");
        assert_eq!(format(-10.0, 3), "-10");
        assert_eq!(format(0.0, 3), "0");
    }

    #[test]
    fn test_format_strips_fractional_zeros() {
        assert_eq!(format(11.92, 3), "11.92");
        assert_eq!(format(0.5, 3), "0.5");
        assert_eq!(format(2.100, 3), "2.1");
    }

    #[test]
    fn test_format_rounds_half_up() {
        assert_eq!(format(2.5, 0), "3");
        assert_eq!(format(-2.5, 0), "-3");
        assert_eq!(format(0.1235, 3), "0.124");
        assert_eq!(format(10.0 / 3.0, 3), "3.333");
    }

    #[test]
    fn test_format_respects_scale() {
        assert_eq!(format(1.0 / 3.0, 1), "0.3");
        assert_eq!(format(2.0 / 3.0, 1), "0.7");
        assert_eq!(format(1.23456, 0), "1");
        assert_eq!(format(1.23456, 5), "1.23456");
    }

    #[test]
    fn test_format_binary_representation_decides_ties() {
        // 2.675 的二进制值略低于 2.675，向下取整
        assert_eq!(format(2.675, 2), "2.67");
        assert_eq!(format(0.1 + 0.2, 3), "0.3");
    }
}
