//! 事件匹配。
//!
//! 将查询代理返回的原始事件按规则集分类，并推导整个运单的妥投状态。

use tracking_domain::{MatchRule, TicketSearch};

/// 将匹配规则代码映射为事件状态码。
/// 返回状态码以及是否表示已妥投。
fn rule_code_to_state(code: &str) -> (i32, bool) {
    match code {
        // 已妥投。
        "Delivered" => (3, true),
        // 投递失败。
        "Undelivered" => (8, false),
        // 状态未知。
        _ => (2, false),
    }
}

/// 匹配查询对象中的事件。
///
/// 事件按时间降序稳定排序后逐个匹配：第一次遍历使用查询代理类别的
/// 规则，没有命中时第二次遍历使用运输商类别的兜底规则。任何事件命中
/// 已妥投时，整个查询对象被标记为已妥投，妥投时间和地点取该事件。
pub fn match_events(rules: &[MatchRule], ts: &mut TicketSearch) {
    // 时间上越晚的事件越靠前。`sort_by`是稳定排序，时间相同的事件
    // 保持输入顺序。
    ts.events.sort_by(|a, b| b.date.cmp(&a.date));

    for i in 0..ts.events.len() {
        let mut matched = false;
        let mut delivered = false;
        ts.events[i].state = 2;

        for rule in rules.iter().filter(|r| r.target_type != "4") {
            if rule.matches(&ts.events[i].details) {
                let (state, d) = rule_code_to_state(&rule.code);
                ts.events[i].state = state;
                delivered = d;
                matched = true;
                break;
            }
        }

        if !matched {
            for rule in rules.iter().filter(|r| r.target_type == "4") {
                if rule.matches(&ts.events[i].details) {
                    let (state, d) = rule_code_to_state(&rule.code);
                    ts.events[i].state = state;
                    delivered = d;
                    break;
                }
            }
        }

        if delivered {
            ts.done = true;
            ts.done_time = Some(ts.events[i].date);
            ts.done_place = ts.events[i].place.clone();
        }
    }
}
