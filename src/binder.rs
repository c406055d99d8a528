// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 参数绑定与 JSON 编解码
//!
//! 两者都是处理器调用器的外部协作者，以 trait 的形式注入，
//! 默认实现分别是 [`DefaultBinder`] 和 [`SerdeJsonCodec`]。

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use crate::{exception::Exception, route::ParamType};

/// 把原始字符串转换为处理器需要的类型化参数
#[cfg_attr(test, mockall::automock)]
pub trait ParameterBinder: Send + Sync {
    fn bind(&self, raw: &str, target: &ParamType) -> Result<Value, Exception>;

    /// 参数表中没有同名参数时，用整张参数表构造自定义对象
    fn bind_object(
        &self,
        params: &HashMap<String, String>,
        target: &ParamType,
    ) -> Result<Value, Exception>;
}

#[cfg_attr(test, mockall::automock)]
pub trait JsonCodec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String, Exception>;
    fn decode(&self, text: &str, target: &ParamType) -> Result<Value, Exception>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBinder;

impl ParameterBinder for DefaultBinder {
    fn bind(&self, raw: &str, target: &ParamType) -> Result<Value, Exception> {
        let trimmed = raw.trim();
        match target {
            ParamType::Str => Ok(Value::String(raw.to_string())),
            ParamType::Int => trimmed
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| Exception::BindingFault(format!("无法把'{}'转换为整数", raw))),
            ParamType::Float => trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| Exception::BindingFault(format!("无法把'{}'转换为浮点数", raw))),
            ParamType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "off" | "no" => Ok(Value::Bool(false)),
                _ => Err(Exception::BindingFault(format!(
                    "无法把'{}'转换为布尔值",
                    raw
                ))),
            },
            ParamType::Object(name) => serde_json::from_str(raw).map_err(|e| {
                Exception::BindingFault(format!("无法把参数解析为{}：{}", name, e))
            }),
        }
    }

    fn bind_object(
        &self,
        params: &HashMap<String, String>,
        target: &ParamType,
    ) -> Result<Value, Exception> {
        match target {
            ParamType::Object(_) => {
                let map: Map<String, Value> = params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                Ok(Value::Object(map))
            }
            // 缺失的标量参数
            _ => Ok(Value::Null),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonCodec;

impl JsonCodec for SerdeJsonCodec {
    fn encode(&self, value: &Value) -> Result<String, Exception> {
        serde_json::to_string(value).map_err(|e| Exception::HandlerFault(e.to_string()))
    }

    fn decode(&self, text: &str, target: &ParamType) -> Result<Value, Exception> {
        serde_json::from_str(text).map_err(|e| {
            Exception::BindingFault(format!("JSON请求体无法解析为{:?}：{}", target, e))
        })
    }
}
