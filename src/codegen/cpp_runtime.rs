//! C++ support code emitted once at the top of every generated program:
//! container aliases, negative-index and half-open slice helpers, and the
//! value-to-text helpers behind print().

pub const CPP_HEADERS: &str = r#"#include <any>
#include <cmath>
#include <cstdlib>
#include <iostream>
#include <sstream>
#include <string>
#include <utility>
#include <vector>

"#;

pub const CPP_CONTAINERS: &str = r#"using PyList = std::vector<std::any>;
using PyDict = std::vector<std::pair<std::string, std::any>>;

"#;

pub const CPP_NUMERIC: &str = r#"static long long py_floordiv(double lhs, double rhs) {
    return (long long)std::floor(lhs / rhs);
}

static double py_mod(double lhs, double rhs) {
    return std::fmod(lhs, rhs);
}

"#;

pub const CPP_INDEXING: &str = r#"static const long long PY_END = 1LL << 62;

static size_t py_slice_bound(long long bound, size_t size) {
    long long n = (long long)size;
    if (bound == PY_END) return size;
    if (bound < 0) bound += n;
    if (bound < 0) bound = 0;
    if (bound > n) bound = n;
    return (size_t)bound;
}

static std::any py_index(const PyList &seq, long long index) {
    long long n = (long long)seq.size();
    if (index < 0) index += n;
    if (index < 0 || index >= n) {
        std::cerr << "IndexError: index out of range" << std::endl;
        std::exit(1);
    }
    return seq[(size_t)index];
}

static std::string py_index(const std::string &seq, long long index) {
    long long n = (long long)seq.size();
    if (index < 0) index += n;
    if (index < 0 || index >= n) {
        std::cerr << "IndexError: index out of range" << std::endl;
        std::exit(1);
    }
    return std::string(1, seq[(size_t)index]);
}

static std::any py_index(const std::any &seq, long long index) {
    return py_index(std::any_cast<PyList>(seq), index);
}

static std::any py_dict_get(const PyDict &dict, const std::string &key) {
    for (const auto &entry : dict) {
        if (entry.first == key) return entry.second;
    }
    std::cerr << "KeyError: " << key << std::endl;
    std::exit(1);
}

static PyList py_slice(const PyList &seq, long long lower, long long upper) {
    size_t begin = py_slice_bound(lower, seq.size());
    size_t end = py_slice_bound(upper, seq.size());
    if (end < begin) end = begin;
    return PyList(seq.begin() + begin, seq.begin() + end);
}

static std::string py_slice(const std::string &seq, long long lower, long long upper) {
    size_t begin = py_slice_bound(lower, seq.size());
    size_t end = py_slice_bound(upper, seq.size());
    if (end < begin) end = begin;
    return seq.substr(begin, end - begin);
}

static long long py_len(const PyList &seq) { return (long long)seq.size(); }
static long long py_len(const PyDict &dict) { return (long long)dict.size(); }
static long long py_len(const std::string &seq) { return (long long)seq.size(); }

"#;

pub const CPP_STRINGS: &str = r#"static std::string py_str(long long value) { return std::to_string(value); }
static std::string py_str(double value) {
    std::ostringstream out;
    out << value;
    return out.str();
}
static std::string py_str(bool value) { return value ? "True" : "False"; }
static std::string py_str(const std::string &value) { return value; }

"#;

pub const CPP_REPR: &str = r#"static std::string py_repr(const std::any &value);

static std::string py_repr(long long value) { return std::to_string(value); }
static std::string py_repr(double value) { return py_str(value); }
static std::string py_repr(bool value) { return value ? "True" : "False"; }
static std::string py_repr(const std::string &value) { return value; }

static std::string py_repr(const PyList &seq) {
    std::string out = "[";
    for (size_t i = 0; i < seq.size(); i++) {
        if (i > 0) out += ", ";
        out += py_repr(seq[i]);
    }
    return out + "]";
}

static std::string py_repr(const PyDict &dict) {
    std::string out = "{";
    for (size_t i = 0; i < dict.size(); i++) {
        if (i > 0) out += ", ";
        out += dict[i].first + ": " + py_repr(dict[i].second);
    }
    return out + "}";
}

static std::string py_repr(const std::any &value) {
    if (!value.has_value()) return "None";
    if (value.type() == typeid(long long)) return py_repr(std::any_cast<long long>(value));
    if (value.type() == typeid(int)) return py_repr((long long)std::any_cast<int>(value));
    if (value.type() == typeid(double)) return py_repr(std::any_cast<double>(value));
    if (value.type() == typeid(bool)) return py_repr(std::any_cast<bool>(value));
    if (value.type() == typeid(std::string)) return py_repr(std::any_cast<std::string>(value));
    if (value.type() == typeid(const char *)) return std::string(std::any_cast<const char *>(value));
    if (value.type() == typeid(PyList)) return py_repr(std::any_cast<PyList>(value));
    if (value.type() == typeid(PyDict)) return py_repr(std::any_cast<PyDict>(value));
    return "<object>";
}

"#;

/// Escapes a converted string literal back into C++ source form.
pub fn escape_cpp_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_and_quote_characters() {
        assert_eq!(escape_cpp_string("a\"b"), "a\\\"b");
        assert_eq!(escape_cpp_string("line\nnext\ttab"), "line\\nnext\\ttab");
        assert_eq!(escape_cpp_string("back\\slash"), "back\\\\slash");
        assert_eq!(escape_cpp_string("plain"), "plain");
    }
}
