//! 工具分类：按名字把一个计划拆成内部 / 外部两部分（纯函数，无副作用）
//!
//! 互斥约束（同一轮不能混用两类）由 Turn Controller 负责检查，这里只做划分。

use std::collections::HashSet;

use crate::memory::ToolCallPlan;

/// 划分结果；两部分各自保持原计划中的相对顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedPlan {
    pub internal: ToolCallPlan,
    pub external: ToolCallPlan,
}

impl ClassifiedPlan {
    pub fn is_mixed(&self) -> bool {
        !self.internal.is_empty() && !self.external.is_empty()
    }
}

pub fn classify(plan: &ToolCallPlan, internal_names: &HashSet<String>) -> ClassifiedPlan {
    let (internal, external) = plan
        .iter()
        .cloned()
        .partition(|request| internal_names.contains(&request.name));
    ClassifiedPlan { internal, external }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolRequest;

    fn request(id: &str, name: &str) -> ToolRequest {
        ToolRequest::new(id, name, Default::default())
    }

    fn internal_set() -> HashSet<String> {
        ["web_search", "web_scrap", "rag_retrieve"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_partition_is_total_and_disjoint() {
        let plan = vec![
            request("1", "web_search"),
            request("2", "send_email"),
            request("3", "rag_retrieve"),
            request("4", "fetch_latest_email"),
        ];
        let classified = classify(&plan, &internal_set());

        assert_eq!(classified.internal.len() + classified.external.len(), plan.len());
        for req in &plan {
            let in_internal = classified.internal.contains(req);
            let in_external = classified.external.contains(req);
            assert!(in_internal ^ in_external, "{} must be in exactly one side", req.id);
        }
        let ids: Vec<&str> = classified.internal.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(classified.is_mixed());
    }

    #[test]
    fn test_single_sided_plans() {
        let internal_only = classify(&vec![request("1", "web_scrap")], &internal_set());
        assert!(internal_only.external.is_empty());
        assert!(!internal_only.is_mixed());

        let external_only = classify(&vec![request("1", "send_email")], &internal_set());
        assert!(external_only.internal.is_empty());
        assert!(!external_only.is_mixed());

        let empty = classify(&Vec::new(), &internal_set());
        assert_eq!(empty, ClassifiedPlan::default());
    }
}
